//! Combinations: named boolean trees over other objects
//!
//! A combination is stored as an ordinary geometry record with the
//! COMBINATION minor type. Its tree is the bincode-encoded body; the region
//! flag and region properties live in the attribute block.

pub mod path;
pub mod tree;

pub use path::{check_path, full_paths, tree_members, validate_path, FullPath, PathResolver};
pub use tree::{delete_leaf, mat_mul, CombinationNode, DeleteOutcome, Leaf, Matrix, IDENTITY};

use crate::core::codec::{minor, AttributeSet, MajorType, Record};
use crate::core::error::{GeomDbError, Result};
use serde::{Deserialize, Serialize};

const REGION_KEY: &str = "region";
const REGION_ID_KEY: &str = "region_id";
const MATERIAL_KEY: &str = "material";
const SHADER_KEY: &str = "shader";

/// Serialized form of a combination body
#[derive(Debug, Serialize, Deserialize)]
struct CombinationBody {
    tree: Option<CombinationNode>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Combination {
    /// `None` for a combination with no geometry
    pub tree: Option<CombinationNode>,
    pub region: bool,
    /// Everything in the attribute block except the region flag
    pub attributes: AttributeSet,
}

impl Combination {
    pub fn new(tree: Option<CombinationNode>) -> Self {
        Combination {
            tree,
            region: false,
            attributes: AttributeSet::new(),
        }
    }

    /// A region combination
    pub fn region(tree: Option<CombinationNode>) -> Self {
        Combination {
            region: true,
            ..Combination::new(tree)
        }
    }

    pub fn region_id(&self) -> Option<u32> {
        self.attributes.get(REGION_ID_KEY)?.parse().ok()
    }

    pub fn set_region_id(&mut self, id: u32) -> Result<()> {
        self.attributes.insert(REGION_ID_KEY, id.to_string())
    }

    pub fn material(&self) -> Option<&str> {
        self.attributes.get(MATERIAL_KEY)
    }

    pub fn set_material(&mut self, material: &str) -> Result<()> {
        self.attributes.insert(MATERIAL_KEY, material)
    }

    pub fn shader(&self) -> Option<&str> {
        self.attributes.get(SHADER_KEY)
    }

    pub fn set_shader(&mut self, shader: &str) -> Result<()> {
        self.attributes.insert(SHADER_KEY, shader)
    }

    /// Leaf names, left to right
    pub fn members(&self) -> Vec<&str> {
        self.tree
            .as_ref()
            .map(|tree| tree.leaves().into_iter().map(|leaf| leaf.name.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn contains_member(&self, name: &str) -> bool {
        self.tree
            .as_ref()
            .map_or(false, |tree| tree.contains_leaf(name))
    }

    /// Decode from a combination record
    pub fn from_record(record: &Record) -> Result<Self> {
        if !record.is_combination() {
            return Err(GeomDbError::NotACombination(record.name.clone()));
        }

        let body: CombinationBody = bincode::deserialize(&record.body)?;
        let mut attributes = record.attributes.clone();
        let region = attributes.is_set(REGION_KEY);
        attributes.remove(REGION_KEY);

        Ok(Combination {
            tree: body.tree,
            region,
            attributes,
        })
    }

    /// Encode into a record named `name`
    pub fn to_record(&self, name: &str) -> Result<Record> {
        let body = bincode::serialize(&CombinationBody {
            tree: self.tree.clone(),
        })?;

        let mut attributes = self.attributes.clone();
        if self.region {
            attributes.insert(REGION_KEY, "R")?;
        } else {
            attributes.remove(REGION_KEY);
        }

        Ok(Record::new(name, MajorType::Geometry, minor::COMBINATION, body)?
            .with_attributes(attributes))
    }
}

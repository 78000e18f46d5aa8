//! Declarative struct descriptions
//!
//! Structs are described in TOML, one `[[struct]]` table per struct with its
//! fields in declaration order:
//!
//! ```toml
//! [[struct]]
//! name = "node"
//!
//! [[struct.field]]
//! name = "value"
//! type = "int"
//!
//! [[struct.field]]
//! name = "next"
//! type = "struct"
//! target = "node"
//! pointer = 1
//!
//! [[struct.field]]
//! name = "label"
//! type = "char"
//! cardinality = 16
//! ```
//!
//! Structs are defined in order. Embedding a struct by value requires it to
//! be defined already; a pointer to a struct that is not defined yet (such
//! as a self reference) becomes an opaque `void*`.

use crate::error::LayoutError;
use crate::layout::{FieldSpec, LayoutRegistry, StructLayout};
use crate::logging::perf;
use crate::types::TypeDescriptor;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// C type names accepted in descriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CType {
    Char,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    /// Platform `long`
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
    /// Opaque `void*`
    Pointer,
    Struct,
    Void,
}

impl CType {
    /// Descriptor for non-struct kinds
    pub fn primitive(self) -> Option<TypeDescriptor> {
        Some(match self {
            Self::Char => TypeDescriptor::i8(),
            Self::UnsignedChar => TypeDescriptor::u8(),
            Self::Short => TypeDescriptor::i16(),
            Self::UnsignedShort => TypeDescriptor::u16(),
            Self::Int => TypeDescriptor::i32(),
            Self::UnsignedInt => TypeDescriptor::u32(),
            Self::Long => TypeDescriptor::c_long(),
            Self::UnsignedLong => TypeDescriptor::c_ulong(),
            Self::LongLong => TypeDescriptor::i64(),
            Self::UnsignedLongLong => TypeDescriptor::u64(),
            Self::Float => TypeDescriptor::F32,
            Self::Double => TypeDescriptor::F64,
            Self::Pointer => TypeDescriptor::void_ptr(),
            Self::Void => TypeDescriptor::Void,
            Self::Struct => return None,
        })
    }
}

fn one() -> usize { 1 }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: CType,

    /// Extra levels of indirection
    #[serde(default)]
    pub pointer: usize,

    /// Struct name for `type = "struct"`
    #[serde(default)]
    pub target: Option<String>,

    #[serde(default = "one")]
    pub cardinality: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,

    #[serde(rename = "field", default)]
    pub fields: Vec<FieldDecl>,
}

impl StructDecl {
    /// Resolve the field list against structs already in `registry`
    pub fn field_specs(&self, registry: &LayoutRegistry) -> Result<Vec<FieldSpec>, LayoutError> {
        self.fields
            .iter()
            .map(|field| {
                let ty = self.resolve(field, registry)?;
                Ok(FieldSpec::array(field.name.clone(), ty, field.cardinality))
            })
            .collect()
    }

    fn resolve(&self, field: &FieldDecl, registry: &LayoutRegistry) -> Result<TypeDescriptor, LayoutError> {
        if let Some(base) = field.ty.primitive() {
            return Ok(TypeDescriptor::pointer_with_depth(base, field.pointer));
        }

        let target = field.target.as_deref().ok_or_else(|| {
            LayoutError::Parse(format!(
                "field `{}` of struct `{}` has type struct but no target",
                field.name, self.name
            ))
        })?;

        match (registry.get(target), field.pointer) {
            (Some(layout), depth) => Ok(TypeDescriptor::pointer_with_depth(
                TypeDescriptor::structure(layout),
                depth,
            )),
            (None, 0) => Err(LayoutError::UnknownStruct {
                strukt: self.name.clone(),
                field: field.name.clone(),
                target: target.to_string(),
            }),
            (None, depth) => Ok(TypeDescriptor::pointer_with_depth(
                TypeDescriptor::void_ptr(),
                depth - 1,
            )),
        }
    }
}

/// Set of struct descriptions, defined in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclSet {
    #[serde(rename = "struct", default)]
    pub structs: Vec<StructDecl>,
}

impl DeclSet {
    pub fn parse(content: &str) -> Result<Self, LayoutError> {
        toml::from_str(content).map_err(|e| LayoutError::Parse(e.to_string()))
    }

    /// Read and parse a description file
    pub fn load(path: &Path) -> Result<Self, LayoutError> {
        let content = fs::read_to_string(path)
            .map_err(|e| LayoutError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Compute and register every struct in order
    pub fn define_all(&self, registry: &LayoutRegistry) -> Result<Vec<Arc<StructLayout>>, LayoutError> {
        let _guard = perf::track("define_structs");
        self.structs
            .iter()
            .map(|decl| registry.define(&decl.name, decl.field_specs(registry)?))
            .collect()
    }
}

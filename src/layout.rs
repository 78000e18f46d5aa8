//! Struct layout engine
//!
//! Computes C ABI field offsets, struct size and alignment from an ordered
//! field list. Layouts are immutable once computed and are shared through
//! `Arc` by every instance and every containing struct. A process-wide
//! registry caches them by struct name.

use crate::error::LayoutError;
use crate::logging::log_layout_computed;
use crate::types::{round_up, TypeDescriptor};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;

/// Field as declared, before placement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    pub name: String,
    pub ty: TypeDescriptor,
    /// Array length, 1 for scalars
    pub cardinality: usize,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self::array(name, ty, 1)
    }

    pub fn array(name: impl Into<String>, ty: TypeDescriptor, cardinality: usize) -> Self {
        Self {
            name: name.into(),
            ty,
            cardinality,
        }
    }
}

/// Placed field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    name: String,
    ty: TypeDescriptor,
    cardinality: usize,
    offset: usize,
}

impl Field {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }

    #[inline]
    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes occupied by the field (all array elements)
    #[inline]
    pub fn size(&self) -> usize {
        self.ty.stride() * self.cardinality
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.ty.align()
    }
}

/// Computed layout of a C struct
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct StructLayout {
    name: String,
    fields: Vec<Field>,
    size: usize,
    align: usize,
}

impl StructLayout {
    /// Place `fields` in declaration order following the C ABI rules
    ///
    /// Each field is placed at the running offset rounded up to the field's
    /// alignment. The struct alignment is the maximum member alignment (1
    /// when empty) and the size is the final offset rounded up to it.
    pub fn compute(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = FieldSpec>,
    ) -> Result<Self, LayoutError> {
        let name = name.into();
        let mut placed = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = 0usize;
        let mut align = 1usize;

        for spec in fields {
            if !spec.ty.is_complete() {
                return Err(LayoutError::IncompleteField {
                    strukt: name,
                    field: spec.name,
                });
            }
            if spec.cardinality == 0 {
                return Err(LayoutError::ZeroCardinality {
                    strukt: name,
                    field: spec.name,
                });
            }
            if !seen.insert(spec.name.clone()) {
                return Err(LayoutError::DuplicateField {
                    strukt: name,
                    field: spec.name,
                });
            }

            let field_align = spec.ty.align();
            offset = round_up(offset, field_align);
            align = align.max(field_align);

            let field = Field {
                name: spec.name,
                ty: spec.ty,
                cardinality: spec.cardinality,
                offset,
            };
            offset += field.size();
            placed.push(field);
        }

        let layout = Self {
            size: round_up(offset, align),
            align,
            name,
            fields: placed,
        };
        log_layout_computed(&layout.name, layout.size, layout.align);
        Ok(layout)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.field(name).map(Field::offset)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field list as declared, for structural comparison on re-registration
    fn specs(&self) -> impl Iterator<Item = FieldSpec> + '_ {
        self.fields
            .iter()
            .map(|f| FieldSpec::array(f.name.clone(), f.ty.clone(), f.cardinality))
    }
}

/// Process-wide struct layout cache
static REGISTRY: Lazy<LayoutRegistry> = Lazy::new(LayoutRegistry::new);

/// Global registry
pub fn registry() -> &'static LayoutRegistry {
    &REGISTRY
}

/// Name-keyed layout cache
///
/// A layout is computed the first time its struct is defined and reused for
/// every later lookup.
pub struct LayoutRegistry {
    layouts: DashMap<String, Arc<StructLayout>>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self {
            layouts: DashMap::new(),
        }
    }

    /// Compute and register `name`, or return the cached layout
    ///
    /// Re-defining a struct with a different field list is an error.
    pub fn define(
        &self,
        name: &str,
        fields: impl IntoIterator<Item = FieldSpec>,
    ) -> Result<Arc<StructLayout>, LayoutError> {
        let fields: Vec<FieldSpec> = fields.into_iter().collect();

        if let Some(existing) = self.layouts.get(name) {
            return if existing.specs().eq(fields.iter().cloned()) {
                Ok(existing.value().clone())
            } else {
                Err(LayoutError::Redefined {
                    strukt: name.to_string(),
                })
            };
        }

        let layout = StructLayout::compute(name, fields.iter().cloned())?;
        match self.layouts.entry(name.to_string()) {
            Entry::Occupied(existing) if existing.get().specs().eq(fields.iter().cloned()) => {
                Ok(existing.get().clone())
            }
            Entry::Occupied(_) => Err(LayoutError::Redefined {
                strukt: name.to_string(),
            }),
            Entry::Vacant(slot) => Ok(slot.insert(Arc::new(layout)).value().clone()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<StructLayout>> {
        self.layouts.get(name).map(|l| l.value().clone())
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;

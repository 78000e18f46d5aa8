//! Layout engine tests

use super::*;
use crate::error::LayoutError;
use crate::types::TypeDescriptor;
use core::mem::size_of;

fn offsets(layout: &StructLayout) -> Vec<usize> {
    layout.fields().iter().map(Field::offset).collect()
}

#[test]
fn char_short_int_packs_naturally() {
    let layout = StructLayout::compute(
        "mixed",
        [
            FieldSpec::new("a", TypeDescriptor::i8()),
            FieldSpec::new("b", TypeDescriptor::i16()),
            FieldSpec::new("c", TypeDescriptor::i32()),
        ],
    )
    .unwrap();

    assert_eq!(offsets(&layout), vec![0, 2, 4]);
    assert_eq!(layout.size(), 8);
    assert_eq!(layout.align(), 4);
}

#[cfg(target_pointer_width = "64")]
#[test]
fn char_then_pointer_on_64_bit() {
    let layout = StructLayout::compute(
        "tagged",
        [
            FieldSpec::new("tag", TypeDescriptor::i8()),
            FieldSpec::new("data", TypeDescriptor::void_ptr()),
        ],
    )
    .unwrap();

    assert_eq!(offsets(&layout), vec![0, 8]);
    assert_eq!(layout.size(), 16);
    assert_eq!(layout.align(), 8);
}

#[test]
fn empty_struct_is_degenerate_but_valid() {
    let layout = StructLayout::compute("empty", Vec::new()).unwrap();
    assert_eq!(layout.size(), 0);
    assert_eq!(layout.align(), 1);
    assert!(layout.is_empty());
}

#[test]
fn trailing_padding_rounds_to_alignment() {
    let layout = StructLayout::compute(
        "padded",
        [
            FieldSpec::new("wide", TypeDescriptor::i32()),
            FieldSpec::new("narrow", TypeDescriptor::u8()),
        ],
    )
    .unwrap();

    assert_eq!(offsets(&layout), vec![0, 4]);
    assert_eq!(layout.size(), 8);
}

#[test]
fn arrays_occupy_contiguous_elements() {
    let layout = StructLayout::compute(
        "with_array",
        [
            FieldSpec::array("bytes", TypeDescriptor::u8(), 3),
            FieldSpec::array("shorts", TypeDescriptor::i16(), 2),
            FieldSpec::new("tail", TypeDescriptor::u8()),
        ],
    )
    .unwrap();

    assert_eq!(offsets(&layout), vec![0, 4, 8]);
    assert_eq!(layout.field("bytes").unwrap().size(), 3);
    assert_eq!(layout.field("shorts").unwrap().size(), 4);
    assert_eq!(layout.size(), 10);
    assert_eq!(layout.align(), 2);
}

#[test]
fn nested_struct_contributes_size_and_alignment() {
    let inner = Arc::new(
        StructLayout::compute(
            "inner",
            [
                FieldSpec::new("x", TypeDescriptor::i32()),
                FieldSpec::new("y", TypeDescriptor::i8()),
            ],
        )
        .unwrap(),
    );
    assert_eq!(inner.size(), 8);

    let outer = StructLayout::compute(
        "outer",
        [
            FieldSpec::new("flag", TypeDescriptor::u8()),
            FieldSpec::new("inner", TypeDescriptor::structure(inner.clone())),
            FieldSpec::array("pair", TypeDescriptor::structure(inner), 2),
        ],
    )
    .unwrap();

    assert_eq!(offsets(&outer), vec![0, 4, 12]);
    assert_eq!(outer.size(), 28);
    assert_eq!(outer.align(), 4);
}

#[test]
fn native_long_follows_platform() {
    let layout = StructLayout::compute(
        "longs",
        [
            FieldSpec::new("c", TypeDescriptor::i8()),
            FieldSpec::new("l", TypeDescriptor::c_long()),
        ],
    )
    .unwrap();

    let long = size_of::<core::ffi::c_long>();
    assert_eq!(layout.offset_of("l"), Some(long));
    assert_eq!(layout.size(), 2 * long);
}

#[test]
fn void_field_is_rejected_with_names() {
    let err = StructLayout::compute(
        "broken",
        [
            FieldSpec::new("ok", TypeDescriptor::i32()),
            FieldSpec::new("bad", TypeDescriptor::Void),
        ],
    )
    .unwrap_err();

    assert_eq!(
        err,
        LayoutError::IncompleteField {
            strukt: "broken".into(),
            field: "bad".into()
        }
    );
    assert!(err.to_string().contains("bad"));
}

#[test]
fn zero_cardinality_is_rejected() {
    let err = StructLayout::compute(
        "zero",
        [FieldSpec::array("none", TypeDescriptor::i32(), 0)],
    )
    .unwrap_err();

    assert!(matches!(err, LayoutError::ZeroCardinality { ref field, .. } if field == "none"));
}

#[test]
fn duplicate_field_is_rejected() {
    let err = StructLayout::compute(
        "dup",
        [
            FieldSpec::new("a", TypeDescriptor::i32()),
            FieldSpec::new("a", TypeDescriptor::i8()),
        ],
    )
    .unwrap_err();

    assert!(matches!(err, LayoutError::DuplicateField { .. }));
}

#[test]
fn offset_lookup_by_name() {
    let layout = StructLayout::compute(
        "lookup",
        [
            FieldSpec::new("first", TypeDescriptor::u16()),
            FieldSpec::new("second", TypeDescriptor::F64),
        ],
    )
    .unwrap();

    assert_eq!(layout.offset_of("first"), Some(0));
    assert_eq!(layout.offset_of("second"), Some(core::mem::align_of::<f64>()));
    assert_eq!(layout.offset_of("missing"), None);
}

#[test]
fn registry_reuses_layouts() {
    let registry = LayoutRegistry::new();
    let fields = || {
        vec![
            FieldSpec::new("a", TypeDescriptor::i32()),
            FieldSpec::new("b", TypeDescriptor::F32),
        ]
    };

    let first = registry.define("point", fields()).unwrap();
    let second = registry.define("point", fields()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);
    assert!(registry.get("point").is_some());
}

#[test]
fn registry_rejects_conflicting_redefinition() {
    let registry = LayoutRegistry::new();
    registry
        .define("conflict", [FieldSpec::new("a", TypeDescriptor::i32())])
        .unwrap();

    let err = registry
        .define("conflict", [FieldSpec::new("a", TypeDescriptor::i64())])
        .unwrap_err();
    assert_eq!(
        err,
        LayoutError::Redefined {
            strukt: "conflict".into()
        }
    );
}

#[test]
fn racing_conflicting_definitions_never_share_a_layout() {
    use std::sync::Barrier;
    use std::thread;

    for round in 0..500 {
        let registry = LayoutRegistry::new();
        let barrier = Barrier::new(2);
        let name = format!("race{}", round);

        let (narrow, wide) = thread::scope(|scope| {
            let narrow = scope.spawn(|| {
                barrier.wait();
                registry.define(&name, [FieldSpec::new("a", TypeDescriptor::i8())])
            });
            let wide = scope.spawn(|| {
                barrier.wait();
                registry.define(&name, [FieldSpec::new("a", TypeDescriptor::F64)])
            });
            (narrow.join().unwrap(), wide.join().unwrap())
        });

        // Exactly one definition wins and each winner gets its own field list
        assert!(narrow.is_ok() != wide.is_ok(), "round {}", round);
        if let Ok(layout) = narrow {
            assert_eq!(layout.field("a").unwrap().ty(), &TypeDescriptor::i8());
        }
        if let Ok(layout) = wide {
            assert_eq!(layout.field("a").unwrap().ty(), &TypeDescriptor::F64);
        }
        assert_eq!(registry.len(), 1);
    }
}

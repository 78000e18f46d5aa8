use abicall::{FieldSpec, Pointer, StructLayout, TypeDescriptor, Value};
use proptest::prelude::*;

fn primitive(kind: u8) -> TypeDescriptor {
    match kind % 12 {
        0 => TypeDescriptor::i8(),
        1 => TypeDescriptor::u8(),
        2 => TypeDescriptor::i16(),
        3 => TypeDescriptor::u16(),
        4 => TypeDescriptor::i32(),
        5 => TypeDescriptor::u32(),
        6 => TypeDescriptor::i64(),
        7 => TypeDescriptor::u64(),
        8 => TypeDescriptor::c_long(),
        9 => TypeDescriptor::F32,
        10 => TypeDescriptor::F64,
        _ => TypeDescriptor::void_ptr(),
    }
}

fn specs(fields: &[(u8, usize)]) -> Vec<FieldSpec> {
    fields
        .iter()
        .enumerate()
        .map(|(i, &(kind, count))| FieldSpec::array(format!("f{}", i), primitive(kind), count))
        .collect()
}

proptest! {
    #[test]
    fn test_layout_invariants(fields in prop::collection::vec((any::<u8>(), 1usize..5), 0..12)) {
        let layout = StructLayout::compute("prop", specs(&fields)).unwrap();

        let max_align = layout.fields().iter().map(|f| f.align()).max().unwrap_or(1);
        prop_assert_eq!(layout.align(), max_align);
        prop_assert_eq!(layout.size() % layout.align(), 0);

        let mut end = 0;
        for field in layout.fields() {
            prop_assert_eq!(field.offset() % field.align(), 0);
            prop_assert!(field.offset() >= end);
            end = field.offset() + field.size();
        }
        prop_assert!(layout.size() >= end);
        prop_assert!(layout.size() < end + layout.align());
    }

    #[test]
    fn test_layout_is_deterministic(fields in prop::collection::vec((any::<u8>(), 1usize..5), 0..12)) {
        let first = StructLayout::compute("twice", specs(&fields)).unwrap();
        let second = StructLayout::compute("twice", specs(&fields)).unwrap();

        prop_assert_eq!(first.size(), second.size());
        prop_assert_eq!(first.align(), second.align());
        let offsets = |l: &StructLayout| l.fields().iter().map(|f| f.offset()).collect::<Vec<_>>();
        prop_assert_eq!(offsets(&first), offsets(&second));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_nested_struct_keeps_alignment(
        inner in prop::collection::vec((any::<u8>(), 1usize..3), 1..6),
        lead in any::<u8>(),
    ) {
        let inner = std::sync::Arc::new(StructLayout::compute("inner", specs(&inner)).unwrap());
        let outer = StructLayout::compute(
            "outer",
            vec![
                FieldSpec::new("lead", primitive(lead)),
                FieldSpec::new("nested", TypeDescriptor::structure(inner.clone())),
            ],
        )
        .unwrap();

        let nested = outer.field("nested").unwrap();
        prop_assert_eq!(nested.offset() % inner.align(), 0);
        prop_assert_eq!(nested.size(), inner.size());
        prop_assert!(outer.align() >= inner.align());
    }

    #[test]
    fn test_i32_array_round_trip(values in prop::collection::vec(any::<i32>(), 1..64)) {
        let view = Pointer::nref(&values).unwrap();
        for (i, &v) in values.iter().enumerate() {
            prop_assert_eq!(unsafe { view.read_scalar::<i32>(i) }, v);
            prop_assert_eq!(unsafe { view.read_at(i) }, Value::I32(v));
        }
    }

    #[test]
    fn test_write_then_read_through_alias(values in prop::collection::vec(any::<f64>(), 1..32)) {
        let view = Pointer::buffer(values.len() * 8, TypeDescriptor::F64).unwrap();
        let alias = Pointer::wrap(view.address(), TypeDescriptor::F64);
        for (i, &v) in values.iter().enumerate() {
            unsafe { view.write_at(i, &Value::F64(v)).unwrap() };
        }
        for (i, &v) in values.iter().enumerate() {
            let read = unsafe { alias.read_scalar::<f64>(i) };
            prop_assert_eq!(read.to_bits(), v.to_bits());
        }
    }

    #[test]
    fn test_offset_is_element_stride(kind in any::<u8>(), n in -64isize..64) {
        let element = primitive(kind);
        let stride = element.stride() as isize;
        let base = Pointer::wrap(0x10_000, element);
        prop_assert_eq!(base.offset(n).address() as isize, 0x10_000 + n * stride);
        prop_assert_eq!(base.offset(n).offset(-n), base);
    }
}

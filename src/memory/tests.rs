//! Typed memory view tests

use super::*;
use crate::layout::{FieldSpec, StructLayout};
use std::collections::HashSet;

fn point_layout() -> Arc<StructLayout> {
    Arc::new(
        StructLayout::compute(
            "point",
            [
                FieldSpec::new("x", TypeDescriptor::i32()),
                FieldSpec::new("y", TypeDescriptor::i32()),
                FieldSpec::new("tag", TypeDescriptor::u8()),
            ],
        )
        .unwrap(),
    )
}

#[test]
fn handler_resolution() {
    assert_eq!(Handler::resolve(&TypeDescriptor::i8()), Handler::I8);
    assert_eq!(Handler::resolve(&TypeDescriptor::u64()), Handler::U64);
    assert_eq!(
        Handler::resolve(&TypeDescriptor::c_ulong()),
        Handler::Long { signed: false }
    );
    assert_eq!(Handler::resolve(&TypeDescriptor::void_ptr()), Handler::Pointer);
    assert_eq!(
        Handler::resolve(&TypeDescriptor::structure(point_layout())),
        Handler::Struct
    );
}

#[test]
fn scalar_round_trip_through_buffer() {
    let cases = [
        (TypeDescriptor::i8(), Value::I8(-7)),
        (TypeDescriptor::u8(), Value::U8(250)),
        (TypeDescriptor::i16(), Value::I16(-1234)),
        (TypeDescriptor::u16(), Value::U16(60000)),
        (TypeDescriptor::i32(), Value::I32(i32::MIN)),
        (TypeDescriptor::u32(), Value::U32(u32::MAX)),
        (TypeDescriptor::i64(), Value::I64(-(1 << 40))),
        (TypeDescriptor::u64(), Value::U64(u64::MAX - 1)),
        (TypeDescriptor::F32, Value::F32(1.5)),
        (TypeDescriptor::F64, Value::F64(-2.25)),
    ];

    for (ty, value) in cases {
        let view = Pointer::buffer(16, ty.clone()).unwrap();
        unsafe {
            view.write(&value).unwrap();
            assert_eq!(view.read(), value, "round trip for {}", ty);
        }
    }
}

#[test]
fn native_long_extends_on_read() {
    let signed = Pointer::buffer(8, TypeDescriptor::c_long()).unwrap();
    let unsigned = signed.cast(TypeDescriptor::c_ulong());
    unsafe {
        signed.write(&Value::I64(-1)).unwrap();
        assert_eq!(signed.read(), Value::I64(-1));
        let all_ones = u64::MAX >> (64 - 8 * size_of::<c_ulong>());
        assert_eq!(unsigned.read(), Value::U64(all_ones));
    }
}

#[test]
fn write_rejects_wrong_kind() {
    let view = Pointer::buffer(8, TypeDescriptor::i32()).unwrap();
    let err = unsafe { view.write(&Value::F64(1.0)) }.unwrap_err();
    assert_eq!(
        err,
        ValueError::TypeMismatch {
            expected: "int32_t".into(),
            found: "f64"
        }
    );
}

#[test]
fn indexed_access_and_offset() {
    let view = Pointer::nref(&[10i16, 20, 30]).unwrap();
    unsafe {
        assert_eq!(view.read_at(2), Value::I16(30));
        assert_eq!(view.offset(1).read(), Value::I16(20));
        assert_eq!(view.offset(2).offset(-1).read(), Value::I16(20));
        view.offset(1).write(&Value::I16(-5)).unwrap();
        assert_eq!(view.read_scalar::<i16>(1), -5);
    }
    assert_eq!(view.offset(3).address(), view.address() + 6);
}

#[test]
fn aliases_observe_writes_immediately() {
    let view = Pointer::buffer(4, TypeDescriptor::u32()).unwrap();
    let alias = view.cast(TypeDescriptor::u8());
    unsafe {
        view.write(&Value::U32(0x0102_0304)).unwrap();
        let low = if cfg!(target_endian = "little") { 0x04 } else { 0x01 };
        assert_eq!(alias.read(), Value::U8(low));
    }
}

#[test]
#[should_panic(expected = "outside buffer")]
fn buffer_views_enforce_extent() {
    let view = Pointer::nref(&[1u32, 2]).unwrap();
    unsafe {
        view.read_at(2);
    }
}

#[test]
fn buffer_writes_past_extent_are_errors() {
    let view = Pointer::nref(&[1u32, 2]).unwrap();
    let at = view.address() + 8;
    unsafe {
        assert_eq!(
            view.write_at(2, &Value::U32(3)),
            Err(ValueError::OutOfExtent { address: at, size: 4 })
        );
        assert_eq!(
            view.offset(1).cast(TypeDescriptor::u64()).write(&Value::U64(u64::MAX)),
            Err(ValueError::OutOfExtent { address: view.address() + 4, size: 8 })
        );
        assert_eq!(view.read_scalar::<u32>(0), 1);
        assert_eq!(view.read_scalar::<u32>(1), 2);
    }
}

#[test]
fn pointer_element_reads_borrowed_pointee() {
    let target = Pointer::nref(&[99i32]).unwrap();
    let slot = Pointer::nref_pointers(&[target.clone()]).unwrap();
    assert_eq!(slot.element(), &TypeDescriptor::pointer_to(TypeDescriptor::i32()));

    unsafe {
        let Value::Pointer(pointee) = slot.read() else {
            panic!("expected pointer");
        };
        assert_eq!(pointee, target);
        assert!(!pointee.is_owned());
        assert_eq!(pointee.read(), Value::I32(99));
    }
}

#[test]
fn cast_pp_dereferences_to_source_view() {
    let view = Pointer::nref(&[5u8]).unwrap();
    let pp = view.cast_pp();
    assert_eq!(pp.element().depth(), 1);

    unsafe {
        let Value::Pointer(inner) = pp.read() else {
            panic!("expected pointer");
        };
        assert_eq!(inner.address(), view.address());
        assert_eq!(inner.read(), Value::U8(5));

        let ppp = pp.cast_pp();
        let Value::Pointer(middle) = ppp.read() else {
            panic!("expected pointer");
        };
        assert_eq!(middle.handler(), Handler::Indirect { levels: 1 });
        assert_eq!(pp.write(&Value::null(TypeDescriptor::u8())), Err(ValueError::ReadOnlyIndirection));
    }
}

#[test]
fn struct_fields_and_copy() {
    let layout = point_layout();
    let a = Pointer::new_struct(layout.clone()).unwrap();
    let b = Pointer::new_struct(layout).unwrap();

    unsafe {
        a.field("x").unwrap().write(&Value::I32(3)).unwrap();
        a.field("y").unwrap().write(&Value::I32(-4)).unwrap();
        a.field("tag").unwrap().write(&Value::U8(9)).unwrap();

        b.write(&Value::Struct(a.clone())).unwrap();
        assert_eq!(b.field("x").unwrap().read(), Value::I32(3));
        assert_eq!(b.field("y").unwrap().read(), Value::I32(-4));
        assert_eq!(b.field("tag").unwrap().read(), Value::U8(9));
    }

    assert!(matches!(
        a.field("z"),
        Err(ValueError::UnknownField { ref field, .. }) if field == "z"
    ));
    assert!(matches!(
        a.field("x").unwrap().field("x"),
        Err(ValueError::NotAStruct(_))
    ));
}

#[test]
fn struct_write_requires_same_layout() {
    let other = Arc::new(
        StructLayout::compute("other", [FieldSpec::new("v", TypeDescriptor::i64())]).unwrap(),
    );
    let target = Pointer::new_struct(point_layout()).unwrap();
    let source = Pointer::new_struct(other).unwrap();
    let err = unsafe { target.write(&Value::Struct(source)) }.unwrap_err();
    assert!(matches!(err, ValueError::TypeMismatch { found: "struct", .. }));
}

#[test]
fn heap_views_own_and_clones_borrow() {
    let heap = Pointer::calloc(4, 4, TypeDescriptor::u32()).unwrap();
    assert!(heap.is_owned());
    let alias = heap.clone();
    assert!(!alias.is_owned());
    unsafe {
        alias.write_at(3, &Value::U32(7)).unwrap();
        assert_eq!(heap.read_at(3), Value::U32(7));
        assert_eq!(heap.read_at(0), Value::U32(0));
    }
    drop(alias);
    drop(heap);
}

#[test]
fn leak_disowns_heap_block() {
    let heap = Pointer::malloc(8, TypeDescriptor::u64()).unwrap();
    let address = heap.leak();
    assert_ne!(address, 0);
    unsafe { libc::free(address as *mut c_void) };
}

#[test]
fn calloc_overflow_is_reported() {
    let err = Pointer::calloc(usize::MAX, 2, TypeDescriptor::u8()).unwrap_err();
    assert_eq!(err, AllocError::Overflow { nmemb: usize::MAX, size: 2 });
}

#[test]
fn nref_requires_values() {
    assert_eq!(Pointer::nref::<i32>(&[]).unwrap_err(), AllocError::ZeroLength);
    assert_eq!(Pointer::nref_pointers(&[]).unwrap_err(), AllocError::ZeroLength);
}

#[test]
fn c_strings() {
    let s = Pointer::nref_str("hello").unwrap();
    assert_eq!(s.extent(), Some(6));
    unsafe {
        assert_eq!(s.read_c_str().as_deref(), Some("hello"));
        assert_eq!(s.read_at(5), Value::I8(0));
        assert_eq!(Pointer::null(TypeDescriptor::i8()).read_c_str(), None);
    }
    let empty = Pointer::nref_str("").unwrap();
    unsafe {
        assert_eq!(empty.read_c_str().as_deref(), Some(""));
    }
}

#[test]
fn unterminated_buffer_string_stops_at_extent() {
    let bytes = Pointer::nref(&[b'a', b'b', b'c', b'd']).unwrap();
    unsafe {
        assert_eq!(bytes.read_c_str(), None);
        bytes.write_at(3, &Value::U8(0)).unwrap();
        assert_eq!(bytes.read_c_str().as_deref(), Some("abc"));
        assert_eq!(bytes.offset(1).read_c_str().as_deref(), Some("bc"));
    }
}

#[cfg(target_pointer_width = "64")]
#[test]
fn cast_value_reinterprets_address() {
    let view = Pointer::wrap(0x1_0000_0042, TypeDescriptor::Void);
    assert_eq!(view.cast_value::<u8>(), 0x42);
    assert_eq!(view.cast_value::<u64>(), 0x1_0000_0042);
    let bits = Pointer::wrap(1.0f32.to_bits() as usize, TypeDescriptor::Void);
    assert_eq!(bits.cast_value::<f32>(), 1.0);
}

#[test]
fn views_compare_and_hash_by_address() {
    let a = Pointer::wrap(0x1000, TypeDescriptor::i32());
    let b = Pointer::wrap(0x1000, TypeDescriptor::F64);
    assert_eq!(a, b);

    let set: HashSet<Pointer> = [a, b, Pointer::wrap(0x2000, TypeDescriptor::i32())]
        .into_iter()
        .collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn void_views_step_bytewise() {
    let view = Pointer::wrap(0x100, TypeDescriptor::Void);
    assert_eq!(view.offset(3).address(), 0x103);
    assert!(unsafe { view.write(&Value::I32(1)) }.is_err());
}

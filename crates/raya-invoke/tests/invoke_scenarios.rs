//! End-to-end invocation through `MethodInvoker::invoke`

mod common;

use common::{Fixture, Point};
use raya_invoke::error::ExceptionKind;
use raya_invoke::{BindingFlags, ErrorCategory, InvokeError, ObjectRef, PrimitiveValue, Strategy};

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_add_interpreted_then_compiled() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.add());

    for (a, b) in [(2, 3), (40, 2), (-7, 7)] {
        let mut args = [heap.box_value(a).unwrap(), heap.box_value(b).unwrap()];
        let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
        assert_eq!(result.unbox::<i32>(), Some(a + b));
    }
    assert_eq!(invoker.strategy(), Strategy::Compiled);
    assert_eq!(invoker.strategy_state().call_count(), 3);
}

#[test]
fn test_value_type_constructor() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.point_ctor());

    let mut args = [heap.box_value(1i32).unwrap(), heap.box_value(2i32).unwrap()];
    let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();

    assert_eq!(result.type_name(), "Point");
    assert_eq!(result.unbox::<Point>(), Some(Point { x: 1, y: 2 }));
}

#[test]
fn test_by_ref_increment_copies_back() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.increment());
    assert!(invoker.needs_by_ref());

    let original = heap.box_value(41i32).unwrap();
    let mut args = [original];
    let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();

    assert!(result.is_null());
    assert_eq!(args[0].unbox::<i32>(), Some(42));
    // The caller's box only changes through copy-back into the array.
    assert_eq!(original.unbox::<i32>(), Some(41));
}

#[test]
fn test_five_mixed_parameters() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.mix5());

    for (negate, expected) in [(false, 6.5), (true, -6.5)] {
        let mut args = [
            heap.box_value(1i32).unwrap(),
            heap.box_value(2i64).unwrap(),
            heap.box_value(0.5f64).unwrap(),
            heap.box_value(3u8).unwrap(),
            heap.box_value(negate).unwrap(),
        ];
        let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
        assert_eq!(result.unbox::<f64>(), Some(expected));
    }
}

#[test]
fn test_thrown_exception_wrapped() {
    let fx = Fixture::new();
    let invoker = fx.runtime.get_invoker(&fx.thrower());

    let err = invoker.invoke(ObjectRef::null(), &mut [], BindingFlags::DEFAULT).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::TargetInvocation);
    match err {
        InvokeError::TargetInvocation(inner) => {
            assert_eq!(inner.kind(), &ExceptionKind::InvalidOperation);
            assert_eq!(inner.message(), "boom");
        }
        other => panic!("expected TargetInvocation, got {other:?}"),
    }
}

#[test]
fn test_thrown_exception_unwrapped() {
    let fx = Fixture::new();
    let invoker = fx.runtime.get_invoker(&fx.thrower());

    let err = invoker
        .invoke(ObjectRef::null(), &mut [], BindingFlags::DO_NOT_WRAP_EXCEPTIONS)
        .unwrap_err();
    assert!(matches!(&err, InvokeError::Thrown(e) if e.kind() == &ExceptionKind::InvalidOperation));

    let err = invoker.invoke_direct(ObjectRef::null(), &mut []).unwrap_err();
    assert_eq!(err.exception().map(|e| e.message()), Some("boom"));
    assert!(matches!(err, InvokeError::Thrown(_)));
}

// ============================================================================
// Shape and Target Validation
// ============================================================================

#[test]
fn test_parameter_count_mismatch() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.add());

    let mut args = [heap.box_value(1i32).unwrap()];
    let err = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap_err();
    assert!(matches!(err, InvokeError::ParameterCountMismatch { expected: 2, actual: 1 }));
    assert_eq!(err.category(), ErrorCategory::Shape);
}

#[test]
fn test_static_method_ignores_target() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.add());

    let junk = heap.box_value(Point { x: 1, y: 1 }).unwrap();
    let mut args = [heap.box_value(1i32).unwrap(), heap.box_value(1i32).unwrap()];
    let result = invoker.invoke(junk, &mut args, BindingFlags::DEFAULT).unwrap();
    assert_eq!(result.unbox::<i32>(), Some(2));
}

#[test]
fn test_instance_method_on_class() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let ctor = fx.runtime.get_invoker(&fx.counter_ctor());
    let add_to = fx.runtime.get_invoker(&fx.counter_add());

    let counter = ctor.invoke(ObjectRef::null(), &mut [], BindingFlags::DEFAULT).unwrap();
    assert_eq!(counter.type_name(), "Counter");
    assert_eq!(counter.field::<i32>("value"), Some(0));

    for expected in [5, 10, 15] {
        let mut args = [heap.box_value(5i32).unwrap()];
        let result = add_to.invoke(counter, &mut args, BindingFlags::DEFAULT).unwrap();
        assert_eq!(result.unbox::<i32>(), Some(expected));
    }
    assert_eq!(counter.field::<i32>("value"), Some(15));
}

#[test]
fn test_instance_method_on_value_type() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.point_sum());

    let point = heap.box_value(Point { x: 3, y: 4 }).unwrap();
    let result = invoker.invoke(point, &mut [], BindingFlags::DEFAULT).unwrap();
    assert_eq!(result.unbox::<i32>(), Some(7));
}

#[test]
fn test_missing_target() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.counter_add());

    let mut args = [heap.box_value(1i32).unwrap()];
    let err = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap_err();
    assert!(matches!(err, InvokeError::TargetRequired { .. }));
    assert_eq!(err.category(), ErrorCategory::Target);
}

#[test]
fn test_wrong_target_type() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.counter_add());

    let point = heap.box_value(Point::default()).unwrap();
    let mut args = [heap.box_value(1i32).unwrap()];
    let err = invoker.invoke(point, &mut args, BindingFlags::DEFAULT).unwrap_err();
    match err {
        InvokeError::TargetMismatch { expected, actual } => {
            assert_eq!(expected, "Counter");
            assert_eq!(actual, "Point");
        }
        other => panic!("expected TargetMismatch, got {other:?}"),
    }
}

// ============================================================================
// Argument Binding
// ============================================================================

#[test]
fn test_missing_argument_takes_default() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let method = types
        .method("Scale", &fx.math)
        .param("x", &fx.int32)
        .param_default("factor", &fx.int32, 10i32)
        .returns(&fx.int32)
        .body(|frame| {
            let product = frame.arg::<i32>(0)? * frame.arg::<i32>(1)?;
            frame.set_return(product)
        })
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    let mut args = [heap.box_value(4i32).unwrap(), heap.missing()];
    let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
    assert_eq!(result.unbox::<i32>(), Some(40));
    assert_eq!(args[1].unbox::<i32>(), Some(10));
}

#[test]
fn test_missing_argument_without_default() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.add());

    let mut args = [heap.box_value(1i32).unwrap(), heap.missing()];
    let err = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap_err();
    match err {
        InvokeError::MissingArgument { index, name } => {
            assert_eq!(index, 1);
            assert_eq!(name, "b");
        }
        other => panic!("expected MissingArgument, got {other:?}"),
    }
}

#[test]
fn test_null_default_for_reference_parameter() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let method = types
        .method("IsNull", &fx.math)
        .param_default_null("value", types.object())
        .returns(&fx.boolean)
        .body(|frame| {
            let value = frame.arg_object(0)?;
            frame.set_return(value.is_null())
        })
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    let mut args = [heap.missing()];
    let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
    assert_eq!(result.unbox::<bool>(), Some(true));
    assert!(args[0].is_null());
}

#[test]
fn test_null_value_argument_is_zeroed() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.add());

    let mut args = [ObjectRef::null(), heap.box_value(5i32).unwrap()];
    let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
    assert_eq!(result.unbox::<i32>(), Some(5));
}

#[test]
fn test_primitive_widening() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.mix5());

    let mut args = [
        heap.box_value(1i16).unwrap(),
        heap.box_value(2i32).unwrap(),
        heap.box_value(3i32).unwrap(),
        heap.box_value(4u8).unwrap(),
        heap.box_value(false).unwrap(),
    ];
    let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
    assert_eq!(result.unbox::<f64>(), Some(10.0));
}

#[test]
fn test_exact_binding_rejects_widening() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.add());

    let mut args = [heap.box_value(1i16).unwrap(), heap.box_value(2i32).unwrap()];
    let err = invoker.invoke_direct(ObjectRef::null(), &mut args).unwrap_err();
    match err {
        InvokeError::ArgumentTypeMismatch { index, expected, actual } => {
            assert_eq!(index, 0);
            assert_eq!(expected, "Int32");
            assert_eq!(actual, "Int16");
        }
        other => panic!("expected ArgumentTypeMismatch, got {other:?}"),
    }
}

#[test]
fn test_unconvertible_argument() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.add());

    let mut args = [heap.box_value(1.5f64).unwrap(), heap.box_value(2i32).unwrap()];
    let err = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap_err();
    assert!(matches!(err, InvokeError::ArgumentTypeMismatch { index: 0, .. }));
    assert_eq!(err.category(), ErrorCategory::Binding);
}

#[test]
fn test_reference_argument_assignability() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let method = types
        .method("Read", &fx.math)
        .param("counter", &fx.counter)
        .returns(&fx.int32)
        .body(|frame| {
            let counter = frame.arg_object(0)?;
            frame.set_return(counter.field::<i32>("value").unwrap_or(-1))
        })
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    let counter = heap.allocate(&fx.counter).unwrap();
    counter.set_field("value", 9i32);
    let mut args = [counter];
    let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
    assert_eq!(result.unbox::<i32>(), Some(9));

    let mut args = [heap.box_value(Point::default()).unwrap()];
    let err = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap_err();
    assert!(matches!(err, InvokeError::ArgumentTypeMismatch { index: 0, .. }));
}

// ============================================================================
// By-Ref, Nullable and Pointer Parameters
// ============================================================================

#[test]
fn test_by_ref_reference_swap() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let by_ref_object = fx.by_ref(types.object());
    let method = types
        .method("Swap", &fx.math)
        .param("a", &by_ref_object)
        .param("b", &by_ref_object)
        .body(|frame| {
            let a = frame.arg_object(0)?;
            let b = frame.arg_object(1)?;
            frame.set_arg_object(0, b)?;
            frame.set_arg_object(1, a)
        })
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    let first = heap.allocate(&fx.counter).unwrap();
    let second = heap.box_value(7i32).unwrap();
    let mut args = [first, second];
    invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
    assert_eq!(args, [second, first]);
}

#[test]
fn test_by_ref_nullable_copies_back() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let nullable = fx.nullable(&fx.int32);
    let method = types
        .method("DoubleOrClear", &fx.math)
        .param("x", &fx.by_ref(&nullable))
        .body(|frame| {
            let value = frame.arg_nullable::<i32>(0)?;
            frame.set_arg_nullable(0, value.filter(|&x| x != 0).map(|x| x * 2))
        })
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    let mut args = [heap.box_value(21i32).unwrap()];
    invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
    assert_eq!(args[0].unbox::<i32>(), Some(42));

    let mut args = [heap.box_value(0i32).unwrap()];
    invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
    assert!(args[0].is_null());

    let mut args = [ObjectRef::null()];
    invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
    assert!(args[0].is_null());
}

#[test]
fn test_nullable_parameter_and_return() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let nullable = fx.nullable(&fx.int32);
    let method = types
        .method("Half", &fx.math)
        .param("x", &nullable)
        .returns(&nullable)
        .body(|frame| {
            let half = frame.arg_nullable::<i32>(0)?.filter(|x| x % 2 == 0).map(|x| x / 2);
            frame.set_return_nullable(half)
        })
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    let cases = [(Some(8), Some(4)), (Some(3), None), (None, None)];
    for (input, expected) in cases {
        let arg = match input {
            Some(v) => heap.box_value(v).unwrap(),
            None => ObjectRef::null(),
        };
        let mut args = [arg];
        let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
        assert_eq!(result.unbox::<i32>(), expected);
        assert_eq!(result.is_null(), expected.is_none());
    }
}

#[test]
fn test_by_ref_return() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let by_ref_int = fx.by_ref(&fx.int32);
    let method = types
        .method("Pick", &fx.math)
        .param("x", &by_ref_int)
        .returns(&by_ref_int)
        .body(|frame| {
            *frame.arg_mut::<i32>(0)? += 100;
            frame.set_return_ref_to_arg(0)
        })
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    let mut args = [heap.box_value(7i32).unwrap()];
    let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
    assert_eq!(result.unbox::<i32>(), Some(107));
    assert_eq!(args[0].unbox::<i32>(), Some(107));
}

#[test]
fn test_null_by_ref_return() {
    let fx = Fixture::new();
    let types = fx.runtime.types();
    let method = types
        .method("Nowhere", &fx.math)
        .returns(&fx.by_ref(&fx.int32))
        .body(|frame| unsafe { frame.set_return_ref(std::ptr::null_mut()) })
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    let err = invoker.invoke(ObjectRef::null(), &mut [], BindingFlags::DEFAULT).unwrap_err();
    assert!(matches!(err, InvokeError::NullRefReturned { ref method } if method == "Nowhere"));
}

#[test]
fn test_pointer_argument_and_return() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let pointer = types.pointer_of(&fx.int32).unwrap();
    let method = types
        .method("Bump", &fx.math)
        .param("p", &pointer)
        .returns(&pointer)
        .body(|frame| {
            let p = frame.arg_pointer(0)? as *mut i32;
            // SAFETY: the test passes the address of a live i32.
            unsafe { *p += 1 };
            frame.set_return_pointer(p as *mut u8)
        })
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    let mut value = 9i32;
    let address = &mut value as *mut i32 as isize;
    let mut args = [heap.box_primitive(PrimitiveValue::IntPtr(address)).unwrap()];
    let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();

    assert_eq!(result.unbox::<isize>(), Some(address));
    assert_eq!(value, 10);
}

// ============================================================================
// Round-Trip Boxing
// ============================================================================

#[test]
fn test_struct_round_trip() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let method = types
        .method("Mirror", &fx.math)
        .param("p", &fx.point)
        .returns(&fx.point)
        .body(|frame| {
            let p = frame.arg::<Point>(0)?;
            frame.set_return(Point { x: p.y, y: p.x })
        })
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    for _ in 0..3 {
        let mut args = [heap.box_value(Point { x: 1, y: -1 }).unwrap()];
        let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
        assert_eq!(result.unbox::<Point>(), Some(Point { x: -1, y: 1 }));
    }
}

#[test]
fn test_void_method_returns_null() {
    let fx = Fixture::new();
    let types = fx.runtime.types();
    let method = types.method("Noop", &fx.math).body(|_| Ok(())).build().unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    let result = invoker.invoke(ObjectRef::null(), &mut [], BindingFlags::DEFAULT).unwrap();
    assert!(result.is_null());
}

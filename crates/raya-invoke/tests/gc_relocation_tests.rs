//! Root registration scoping and slot updates under a relocating collector

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::Fixture;
use raya_invoke::{ArgumentStorage, BindingFlags, InvokeContext, ObjectRef};

// ============================================================================
// Collection During a Call
// ============================================================================

#[test]
fn test_collect_inside_body_boxed() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let method = types
        .method("ReadAfterCollect", &fx.math)
        .param("x", &fx.int32)
        .param("counter", &fx.counter)
        .returns(&fx.int32)
        .body(|frame| {
            // SAFETY: single-threaded test; the frame rereads every slot.
            unsafe { frame.heap().collect() };
            let x = frame.arg::<i32>(0)?;
            let value = frame.arg_object(1)?.field::<i32>("value").unwrap_or(-1);
            frame.set_return(x + value)
        })
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    let counter = heap.allocate(&fx.counter).unwrap();
    counter.set_field("value", 100i32);
    let mut args = [heap.box_value(5i32).unwrap(), counter];

    for _ in 0..2 {
        let before = args[1];
        let result = invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
        assert_eq!(result.unbox::<i32>(), Some(105));
        // The caller's argument array is rooted for the duration of the call.
        assert_ne!(args[1], before);
        assert_eq!(args[1].field::<i32>("value"), Some(100));
    }
    assert!(heap.stats().collections >= 2);
}

#[test]
fn test_collect_inside_body_by_ref() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let method = types
        .method("BumpAfterCollect", &fx.math)
        .param("x", &fx.by_ref(&fx.int32))
        .body(|frame| {
            // SAFETY: single-threaded test; interior slot addresses are rewritten.
            unsafe { frame.heap().collect() };
            *frame.arg_mut::<i32>(0)? += 1;
            Ok(())
        })
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);

    let mut args = [heap.box_value(1i32).unwrap()];
    for expected in [2, 3, 4] {
        invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
        assert_eq!(args[0].unbox::<i32>(), Some(expected));
    }
}

#[test]
fn test_collect_between_binding_and_invoke() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.add());

    let mut storage = ArgumentStorage::new(2);
    let ctx = InvokeContext::new(heap, &mut storage);
    ctx.set_argument(0, heap.box_value(30i32).unwrap()).unwrap();
    ctx.set_argument(1, heap.box_value(12i32).unwrap()).unwrap();

    // SAFETY: the only live references are in the context's registered slots.
    unsafe { heap.collect() };
    assert!(heap.stats().objects_relocated >= 2);

    ctx.invoke(&invoker).unwrap();
    assert_eq!(ctx.return_value::<i32>().unwrap(), 42);
    assert_eq!(ctx.get_argument(0).unwrap().unbox::<i32>(), Some(30));
}

#[test]
fn test_unrooted_temporaries_are_freed() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let invoker = fx.runtime.get_invoker(&fx.add());

    let baseline = heap.object_count();
    for i in 0..10 {
        let mut args = [heap.box_value(i).unwrap(), heap.box_value(i).unwrap()];
        invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();
    }
    assert!(heap.object_count() > baseline);

    // SAFETY: no managed references are held across the collection.
    unsafe { heap.collect() };
    assert_eq!(heap.object_count(), baseline);
}

// ============================================================================
// Registration Scoping
// ============================================================================

#[test]
fn test_roots_registered_only_during_call() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let types = fx.runtime.types();
    let observed = Arc::new(AtomicUsize::new(0));
    let seen = observed.clone();
    let method = types
        .method("Observe", &fx.math)
        .param("x", &fx.int32)
        .body(move |frame| {
            seen.store(frame.heap().root_region_count(), Ordering::Relaxed);
            Ok(())
        })
        .build()
        .unwrap();
    let invoker = fx.runtime.get_invoker(&method);
    let baseline = heap.root_region_count();

    let mut args = [heap.box_value(1i32).unwrap()];
    invoker.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).unwrap();

    // Caller argument array plus the object and address slot arrays.
    assert_eq!(observed.load(Ordering::Relaxed), baseline + 3);
    assert_eq!(heap.root_region_count(), baseline);
}

#[test]
fn test_roots_released_on_error_paths() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let baseline = heap.root_region_count();

    let thrower = fx.runtime.get_invoker(&fx.thrower());
    assert!(thrower.invoke(ObjectRef::null(), &mut [], BindingFlags::DEFAULT).is_err());
    assert_eq!(heap.root_region_count(), baseline);

    let add = fx.runtime.get_invoker(&fx.add());
    let mut args = [heap.box_value(1.0f64).unwrap(), heap.box_value(1i32).unwrap()];
    assert!(add.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).is_err());
    assert_eq!(heap.root_region_count(), baseline);

    let counter_add = fx.runtime.get_invoker(&fx.counter_add());
    let mut args = [heap.box_value(1i32).unwrap()];
    assert!(counter_add.invoke(ObjectRef::null(), &mut args, BindingFlags::DEFAULT).is_err());
    assert_eq!(heap.root_region_count(), baseline);
}

#[test]
fn test_nested_contexts_unregister_lifo() {
    let fx = Fixture::new();
    let heap = fx.runtime.heap();
    let baseline = heap.root_region_count();

    let mut outer_storage = ArgumentStorage::new(1);
    let outer = InvokeContext::new(heap, &mut outer_storage);
    {
        let mut inner_storage = ArgumentStorage::new(12);
        let inner = InvokeContext::new(heap, &mut inner_storage);
        assert_eq!(inner.arg_count(), 12);
        assert_eq!(heap.root_region_count(), baseline + 4);
    }
    assert_eq!(heap.root_region_count(), baseline + 2);
    drop(outer);
    assert_eq!(heap.root_region_count(), baseline);
}

//! Shared fixtures for the invocation integration tests

#![allow(dead_code)]

use std::sync::Arc;

use raya_invoke::error::Exception;
use raya_invoke::method::MethodDescriptor;
use raya_invoke::{InvokeConfig, PrimitiveKind, Runtime, TypeHandle};
use tracing_subscriber::EnvFilter;

/// A user value type
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Route engine logs to the test writer, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Runtime plus the types most tests need
pub struct Fixture {
    pub runtime: Runtime,
    pub int16: TypeHandle,
    pub int32: TypeHandle,
    pub int64: TypeHandle,
    pub double: TypeHandle,
    pub boolean: TypeHandle,
    pub byte: TypeHandle,
    pub point: TypeHandle,
    /// `Counter { value: Int32 }`
    pub counter: TypeHandle,
    /// Static holder class for free functions
    pub math: TypeHandle,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(InvokeConfig::default())
    }

    pub fn with_config(config: InvokeConfig) -> Self {
        Self::from_runtime(Runtime::with_config(config))
    }

    pub fn from_runtime(runtime: Runtime) -> Self {
        init_tracing();
        let types = runtime.types().clone();
        let int32 = types.primitive(PrimitiveKind::Int32).clone();
        let point = types.register_value_type::<Point>("Point").unwrap();
        let counter = types.register_class("Counter", None, &[("value", &int32)]).unwrap();
        let math = types.register_class("Math", None, &[]).unwrap();

        Self {
            int16: types.primitive(PrimitiveKind::Int16).clone(),
            int64: types.primitive(PrimitiveKind::Int64).clone(),
            double: types.primitive(PrimitiveKind::Double).clone(),
            boolean: types.primitive(PrimitiveKind::Boolean).clone(),
            byte: types.primitive(PrimitiveKind::Byte).clone(),
            int32,
            point,
            counter,
            math,
            runtime,
        }
    }

    pub fn by_ref(&self, ty: &TypeHandle) -> TypeHandle {
        self.runtime.types().by_ref_of(ty).unwrap()
    }

    pub fn nullable(&self, ty: &TypeHandle) -> TypeHandle {
        self.runtime.types().nullable_of(ty).unwrap()
    }

    /// `static Int32 Math.Add(Int32 a, Int32 b)`
    pub fn add(&self) -> Arc<MethodDescriptor> {
        self.runtime
            .types()
            .method("Add", &self.math)
            .param("a", &self.int32)
            .param("b", &self.int32)
            .returns(&self.int32)
            .body(|frame| {
                let sum = frame.arg::<i32>(0)? + frame.arg::<i32>(1)?;
                frame.set_return(sum)
            })
            .build()
            .unwrap()
    }

    /// `Point(Int32 x, Int32 y)`
    pub fn point_ctor(&self) -> Arc<MethodDescriptor> {
        self.runtime
            .types()
            .method(".ctor", &self.point)
            .constructor()
            .param("x", &self.int32)
            .param("y", &self.int32)
            .body(|frame| {
                let x = frame.arg::<i32>(0)?;
                let y = frame.arg::<i32>(1)?;
                *frame.this_mut::<Point>()? = Point { x, y };
                Ok(())
            })
            .build()
            .unwrap()
    }

    /// `Counter()` leaving `value` zeroed
    pub fn counter_ctor(&self) -> Arc<MethodDescriptor> {
        self.runtime
            .types()
            .method(".ctor", &self.counter)
            .constructor()
            .body(|_| Ok(()))
            .build()
            .unwrap()
    }

    /// `Int32 Counter.AddTo(Int32 amount)`: adds to `value`, returns the new value
    pub fn counter_add(&self) -> Arc<MethodDescriptor> {
        self.runtime
            .types()
            .method("AddTo", &self.counter)
            .instance()
            .param("amount", &self.int32)
            .returns(&self.int32)
            .body(|frame| {
                let amount = frame.arg::<i32>(0)?;
                let this = frame.this_object()?;
                let value = this.field::<i32>("value").unwrap_or_default() + amount;
                this.set_field("value", value);
                frame.set_return(value)
            })
            .build()
            .unwrap()
    }

    /// `Int32 Point.Sum()`
    pub fn point_sum(&self) -> Arc<MethodDescriptor> {
        self.runtime
            .types()
            .method("Sum", &self.point)
            .instance()
            .returns(&self.int32)
            .body(|frame| {
                let p = frame.this::<Point>()?;
                frame.set_return(p.x + p.y)
            })
            .build()
            .unwrap()
    }

    /// `static void Math.Increment(ref Int32 x)`
    pub fn increment(&self) -> Arc<MethodDescriptor> {
        self.runtime
            .types()
            .method("Increment", &self.math)
            .param("x", &self.by_ref(&self.int32))
            .body(|frame| {
                *frame.arg_mut::<i32>(0)? += 1;
                Ok(())
            })
            .build()
            .unwrap()
    }

    /// `static Double Math.Mix(Int32, Int64, Double, Byte, Boolean)`
    pub fn mix5(&self) -> Arc<MethodDescriptor> {
        self.runtime
            .types()
            .method("Mix", &self.math)
            .param("a", &self.int32)
            .param("b", &self.int64)
            .param("c", &self.double)
            .param("d", &self.byte)
            .param("negate", &self.boolean)
            .returns(&self.double)
            .body(|frame| {
                let sum = frame.arg::<i32>(0)? as f64
                    + frame.arg::<i64>(1)? as f64
                    + frame.arg::<f64>(2)?
                    + frame.arg::<u8>(3)? as f64;
                let result = if frame.arg::<bool>(4)? { -sum } else { sum };
                frame.set_return(result)
            })
            .build()
            .unwrap()
    }

    /// `static void Math.Fail()`: always throws `InvalidOperationError`
    pub fn thrower(&self) -> Arc<MethodDescriptor> {
        self.runtime
            .types()
            .method("Fail", &self.math)
            .body(|_| Err(Exception::invalid_operation("boom")))
            .build()
            .unwrap()
    }
}

//! Method descriptors and the builder that produces them

use std::fmt;
use std::mem::{self, MaybeUninit};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::frame::CallFrame;
use crate::error::{Exception, TypeError};
use crate::types::{ParameterKind, TypeHandle, TypeRegistry};

/// Unique method identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(u64);

impl MethodId {
    /// Allocate a fresh method id
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for MethodId {
    fn default() -> Self {
        Self::new()
    }
}

/// Static, instance, or constructor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// No `this`
    Static,
    /// Receives `this`
    Instance,
    /// Receives a freshly allocated `this` and produces it as the result
    Constructor,
}

/// Declared default value of an optional parameter
#[derive(Clone)]
pub enum DefaultValue {
    /// Null (reference types) or the zero value (value types)
    Null,
    /// Raw payload bytes of a value of the parameter's (underlying) type
    Value(Box<[MaybeUninit<u8>]>),
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Null => f.write_str("Null"),
            DefaultValue::Value(bytes) => write!(f, "Value({} bytes)", bytes.len()),
        }
    }
}

/// A declared parameter
#[derive(Debug, Clone)]
pub struct ParameterInfo {
    name: String,
    ty: TypeHandle,
    default: Option<DefaultValue>,
}

impl ParameterInfo {
    /// Parameter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter type
    pub fn ty(&self) -> &TypeHandle {
        &self.ty
    }

    /// Declared default, if the parameter is optional
    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }
}

/// Method body: reads arguments from and writes results to the call frame
pub type MethodBody = Arc<dyn Fn(&mut CallFrame<'_>) -> Result<(), Exception> + Send + Sync>;

/// Address of an `extern "C"` function implementing a method natively
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeEntry(usize);

impl NativeEntry {
    /// Wrap a function address.
    ///
    /// # Safety
    ///
    /// `address` must be an `extern "C"` function whose signature matches the
    /// method: `this` first (value-type targets by address, class targets by
    /// reference), then each parameter (primitives by value, references as
    /// object pointers, by-refs and pointers as addresses), returning the
    /// primitive or reference return value.
    pub unsafe fn new(address: *const ()) -> Self {
        Self(address as usize)
    }

    /// Raw function address
    pub fn address(&self) -> usize {
        self.0
    }
}

/// An invocable method
pub struct MethodDescriptor {
    id: MethodId,
    name: String,
    kind: MethodKind,
    declaring_type: TypeHandle,
    parameters: Vec<ParameterInfo>,
    return_type: TypeHandle,
    body: MethodBody,
    native_entry: Option<NativeEntry>,
}

impl MethodDescriptor {
    /// Method id
    pub fn id(&self) -> MethodId {
        self.id
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static, instance, or constructor
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    /// No `this` parameter
    pub fn is_static(&self) -> bool {
        self.kind == MethodKind::Static
    }

    /// Constructor
    pub fn is_constructor(&self) -> bool {
        self.kind == MethodKind::Constructor
    }

    /// Whether the body receives `this`
    pub fn has_this(&self) -> bool {
        self.kind != MethodKind::Static
    }

    /// Declaring type
    pub fn declaring_type(&self) -> &TypeHandle {
        &self.declaring_type
    }

    /// Parameters in declaration order
    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }

    /// Number of parameters
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Declared return type (`Void` for constructors)
    pub fn return_type(&self) -> &TypeHandle {
        &self.return_type
    }

    /// Method body
    pub fn body(&self) -> &MethodBody {
        &self.body
    }

    /// Native entry point, if the method has one
    pub fn native_entry(&self) -> Option<NativeEntry> {
        self.native_entry
    }

    /// Raw entry point: the native function or the body closure
    pub fn entry_point(&self) -> usize {
        match self.native_entry {
            Some(entry) => entry.address(),
            None => Arc::as_ptr(&self.body) as *const () as usize,
        }
    }

    /// Parameter kinds in declaration order
    pub fn parameter_kinds(&self) -> impl Iterator<Item = ParameterKind> + '_ {
        self.parameters.iter().map(|p| ParameterKind::classify(&p.ty))
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("declaring_type", &self.declaring_type.name())
            .field("parameters", &self.parameters.len())
            .finish()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}(", self.return_type, self.declaring_type, self.name)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match param.ty.element_type() {
                Some(elem) if param.ty.is_by_ref() => write!(f, "{} ByRef", elem)?,
                _ => write!(f, "{}", param.ty)?,
            }
        }
        f.write_str(")")
    }
}

/// Builder for [`MethodDescriptor`]
///
/// # Example
///
/// ```ignore
/// let add = types
///     .method("Add", &math)
///     .param("a", &int32)
///     .param("b", &int32)
///     .returns(&int32)
///     .body(|frame| {
///         let sum = frame.arg::<i32>(0)? + frame.arg::<i32>(1)?;
///         frame.set_return(sum)
///     })
///     .build()?;
/// ```
pub struct MethodBuilder {
    name: String,
    kind: MethodKind,
    declaring_type: TypeHandle,
    parameters: Vec<ParameterInfo>,
    return_type: TypeHandle,
    body: Option<MethodBody>,
    native_entry: Option<NativeEntry>,
    error: Option<String>,
}

impl MethodBuilder {
    /// Start a static method returning `Void`; see [`TypeRegistry::method`]
    pub fn new(name: impl Into<String>, declaring_type: &TypeHandle, types: &TypeRegistry) -> Self {
        Self {
            name: name.into(),
            kind: MethodKind::Static,
            declaring_type: declaring_type.clone(),
            parameters: Vec::new(),
            return_type: types.void().clone(),
            body: None,
            native_entry: None,
            error: None,
        }
    }

    /// Make this an instance method
    pub fn instance(mut self) -> Self {
        self.kind = MethodKind::Instance;
        self
    }

    /// Make this a constructor
    pub fn constructor(mut self) -> Self {
        self.kind = MethodKind::Constructor;
        self
    }

    /// Add a required parameter
    pub fn param(mut self, name: impl Into<String>, ty: &TypeHandle) -> Self {
        self.parameters.push(ParameterInfo {
            name: name.into(),
            ty: ty.clone(),
            default: None,
        });
        self
    }

    /// Add an optional parameter whose default is null / zero
    pub fn param_default_null(mut self, name: impl Into<String>, ty: &TypeHandle) -> Self {
        self.parameters.push(ParameterInfo {
            name: name.into(),
            ty: ty.clone(),
            default: Some(DefaultValue::Null),
        });
        self
    }

    /// Add an optional parameter with a value-type default
    pub fn param_default<T: Copy + 'static>(mut self, name: impl Into<String>, ty: &TypeHandle, value: T) -> Self {
        let name = name.into();
        let underlying = match ty.element_type() {
            Some(elem) if ty.is_nullable() => elem.clone(),
            _ => ty.clone(),
        };
        if !underlying.is_rust_type::<T>() {
            self.error = Some(format!(
                "default for '{}' is {}, parameter is {}",
                name,
                std::any::type_name::<T>(),
                ty.name()
            ));
            return self;
        }

        let mut bytes = vec![MaybeUninit::<u8>::uninit(); mem::size_of::<T>()].into_boxed_slice();
        // SAFETY: the buffer holds exactly `size_of::<T>()` bytes; copying
        // as `MaybeUninit<u8>` preserves padding without reading it.
        unsafe {
            std::ptr::copy_nonoverlapping(
                &value as *const T as *const MaybeUninit<u8>,
                bytes.as_mut_ptr(),
                mem::size_of::<T>(),
            );
        }
        self.parameters.push(ParameterInfo {
            name,
            ty: ty.clone(),
            default: Some(DefaultValue::Value(bytes)),
        });
        self
    }

    /// Set the return type (defaults to `Void`)
    pub fn returns(mut self, ty: &TypeHandle) -> Self {
        self.return_type = ty.clone();
        self
    }

    /// Set the method body
    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut CallFrame<'_>) -> Result<(), Exception> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    /// Attach a native entry point used by the native-thunk compiler
    pub fn native_entry(mut self, entry: NativeEntry) -> Self {
        self.native_entry = Some(entry);
        self
    }

    /// Finish the method
    pub fn build(self) -> Result<Arc<MethodDescriptor>, TypeError> {
        let invalid = |name: &str, reason: String| TypeError::InvalidMethod {
            name: name.to_string(),
            reason,
        };

        if let Some(reason) = self.error {
            return Err(invalid(&self.name, reason));
        }
        let Some(body) = self.body else {
            return Err(invalid(&self.name, "no body".to_string()));
        };

        if self.kind == MethodKind::Constructor && !self.return_type.is_void() {
            return Err(invalid(&self.name, "constructors return void".to_string()));
        }
        if self.kind != MethodKind::Static && self.declaring_type.is_void() {
            return Err(invalid(&self.name, "instance methods need a declaring type".to_string()));
        }
        if let Some(param) = self.parameters.iter().find(|p| p.ty.is_void()) {
            return Err(invalid(&self.name, format!("parameter '{}' has type Void", param.name)));
        }

        Ok(Arc::new(MethodDescriptor {
            id: MethodId::new(),
            name: self.name,
            kind: self.kind,
            declaring_type: self.declaring_type,
            parameters: self.parameters,
            return_type: self.return_type,
            body,
            native_entry: self.native_entry,
        }))
    }
}

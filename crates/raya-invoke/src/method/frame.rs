//! Call frame handed to method bodies
//!
//! The frame resolves every access through the registered slot arrays at the
//! moment of the access, so a collection inside the body never leaves the
//! frame looking at a stale address.

use std::ptr;

use super::descriptor::MethodDescriptor;
use crate::error::Exception;
use crate::gc::{Heap, ObjectRef};
use crate::invoke::{FrameMode, FrameSlots, Slot};
use crate::types::{ParameterKind, SlotKind, TypeHandle};

/// Typed, kind-checked access to `this`, the arguments and the return slot
pub struct CallFrame<'a> {
    heap: &'a Heap,
    method: &'a MethodDescriptor,
    kinds: &'a [ParameterKind],
    return_kind: Option<ParameterKind>,
    slots: FrameSlots<'a>,
    mode: FrameMode,
}

impl<'a> CallFrame<'a> {
    /// Build a frame over prepared slots.
    ///
    /// `kinds` must classify `method`'s parameters and `return_kind` its
    /// return type (`None` for void returns and constructors).
    pub fn new(
        heap: &'a Heap,
        method: &'a MethodDescriptor,
        kinds: &'a [ParameterKind],
        return_kind: Option<ParameterKind>,
        slots: FrameSlots<'a>,
        mode: FrameMode,
    ) -> Self {
        Self {
            heap,
            method,
            kinds,
            return_kind,
            slots,
            mode,
        }
    }

    /// Heap for allocations made by the body
    pub fn heap(&self) -> &'a Heap {
        self.heap
    }

    /// The method being executed
    pub fn method(&self) -> &'a MethodDescriptor {
        self.method
    }

    /// Number of arguments
    pub fn arg_count(&self) -> usize {
        self.kinds.len()
    }

    /// Marshaling kind of parameter `index`
    pub fn parameter_kind(&self, index: usize) -> Option<ParameterKind> {
        self.kinds.get(index).copied()
    }

    fn parameter(&self, index: usize) -> Result<(ParameterKind, &'a TypeHandle), Exception> {
        let kind = self.kinds.get(index).copied().ok_or_else(|| {
            Exception::argument_out_of_range(format!(
                "argument index {} out of range for {}",
                index, self.method
            ))
        })?;
        let ty = self.method.parameters()[index].ty();
        let storage = match kind {
            ParameterKind::ByRef(_) | ParameterKind::Pointer(_) => ty.element_type().unwrap_or(ty),
            _ => ty,
        };
        Ok((kind, storage))
    }

    fn arg_address(&self, index: usize, kind: ParameterKind) -> *mut u8 {
        self.slots.resolve(Slot::Argument(index), self.mode, kind.is_value_type())
    }

    fn target_address(&self) -> *mut u8 {
        let value_type = self.method.declaring_type().is_value_type();
        self.slots.resolve(Slot::Target, self.mode, value_type)
    }

    fn return_address(&self, kind: ParameterKind) -> *mut u8 {
        self.slots.resolve(Slot::Return, self.mode, kind.is_value_type())
    }

    fn cast_error(what: &str, ty: &TypeHandle, requested: &str) -> Exception {
        Exception::invalid_cast(format!("{} has type {}, not {}", what, ty, requested))
    }

    fn check_address(addr: *mut u8, what: &str) -> Result<*mut u8, Exception> {
        if addr.is_null() {
            Err(Exception::null_reference(format!("{} is not bound", what)))
        } else {
            Ok(addr)
        }
    }

    /// Read a value-type argument (by value or through a by-ref)
    pub fn arg<T: Copy + 'static>(&self, index: usize) -> Result<T, Exception> {
        let (kind, ty) = self.parameter(index)?;
        if !matches!(kind, ParameterKind::Value | ParameterKind::ByRef(SlotKind::Value)) || !ty.is_rust_type::<T>() {
            return Err(Self::cast_error("argument", ty, std::any::type_name::<T>()));
        }
        let addr = Self::check_address(self.arg_address(index, kind), "argument")?;
        // SAFETY: the slot was prepared with storage of exactly this type.
        Ok(unsafe { ptr::read(addr as *const T) })
    }

    /// Mutable access to a by-ref value argument
    pub fn arg_mut<T: Copy + 'static>(&mut self, index: usize) -> Result<&mut T, Exception> {
        let (kind, ty) = self.parameter(index)?;
        if kind != ParameterKind::ByRef(SlotKind::Value) || !ty.is_rust_type::<T>() {
            return Err(Self::cast_error("by-ref argument", ty, std::any::type_name::<T>()));
        }
        let addr = Self::check_address(self.arg_address(index, kind), "argument")?;
        // SAFETY: prepared storage of type `T`; the exclusive borrow of the
        // frame prevents a second live reference through this frame.
        Ok(unsafe { &mut *(addr as *mut T) })
    }

    /// Read a reference argument (by value or through a by-ref)
    pub fn arg_object(&self, index: usize) -> Result<ObjectRef, Exception> {
        let (kind, ty) = self.parameter(index)?;
        if !matches!(kind, ParameterKind::Reference | ParameterKind::ByRef(SlotKind::Reference)) {
            return Err(Self::cast_error("argument", ty, "an object reference"));
        }
        let addr = Self::check_address(self.arg_address(index, kind), "argument")?;
        // SAFETY: reference slots hold an `ObjectRef`.
        Ok(unsafe { ptr::read(addr as *const ObjectRef) })
    }

    /// Store through a by-ref reference argument
    pub fn set_arg_object(&mut self, index: usize, value: ObjectRef) -> Result<(), Exception> {
        let (kind, ty) = self.parameter(index)?;
        if kind != ParameterKind::ByRef(SlotKind::Reference) {
            return Err(Self::cast_error("by-ref argument", ty, "a reference"));
        }
        if let Some(actual) = value.runtime_type() {
            if !ty.is_assignable_from(&actual) {
                return Err(Self::cast_error("value", &actual, ty.name()));
            }
        }
        let addr = Self::check_address(self.arg_address(index, kind), "argument")?;
        // SAFETY: see `arg_object`.
        unsafe { ptr::write(addr as *mut ObjectRef, value) };
        Ok(())
    }

    fn read_nullable<T: Copy + 'static>(ty: &TypeHandle, addr: *mut u8) -> Result<Option<T>, Exception> {
        let underlying_matches = ty.element_type().map(|e| e.is_rust_type::<T>()).unwrap_or(false);
        if !underlying_matches {
            return Err(Self::cast_error("nullable", ty, std::any::type_name::<T>()));
        }
        let offset = ty.nullable_value_offset().unwrap_or(0);
        // SAFETY: nullable storage: has-value byte, then a `T` at `offset`.
        unsafe {
            if *addr == 0 {
                Ok(None)
            } else {
                Ok(Some(ptr::read(addr.add(offset) as *const T)))
            }
        }
    }

    fn write_nullable<T: Copy + 'static>(ty: &TypeHandle, addr: *mut u8, value: Option<T>) -> Result<(), Exception> {
        let underlying_matches = ty.element_type().map(|e| e.is_rust_type::<T>()).unwrap_or(false);
        if !underlying_matches {
            return Err(Self::cast_error("nullable", ty, std::any::type_name::<T>()));
        }
        let offset = ty.nullable_value_offset().unwrap_or(0);
        // SAFETY: see `read_nullable`.
        unsafe {
            ptr::write_bytes(addr, 0, ty.size());
            if let Some(v) = value {
                *addr = 1;
                ptr::write(addr.add(offset) as *mut T, v);
            }
        }
        Ok(())
    }

    /// Read a nullable argument (by value or through a by-ref)
    pub fn arg_nullable<T: Copy + 'static>(&self, index: usize) -> Result<Option<T>, Exception> {
        let (kind, ty) = self.parameter(index)?;
        if !matches!(kind, ParameterKind::Nullable | ParameterKind::ByRef(SlotKind::Nullable)) {
            return Err(Self::cast_error("argument", ty, "a nullable"));
        }
        let addr = Self::check_address(self.arg_address(index, kind), "argument")?;
        Self::read_nullable(ty, addr)
    }

    /// Store through a by-ref nullable argument
    pub fn set_arg_nullable<T: Copy + 'static>(&mut self, index: usize, value: Option<T>) -> Result<(), Exception> {
        let (kind, ty) = self.parameter(index)?;
        if kind != ParameterKind::ByRef(SlotKind::Nullable) {
            return Err(Self::cast_error("by-ref argument", ty, "a nullable"));
        }
        let addr = Self::check_address(self.arg_address(index, kind), "argument")?;
        Self::write_nullable(ty, addr, value)
    }

    /// Read a pointer argument
    pub fn arg_pointer(&self, index: usize) -> Result<*mut u8, Exception> {
        let (kind, ty) = self.parameter(index)?;
        if !matches!(kind, ParameterKind::Pointer(_)) {
            return Err(Self::cast_error("argument", ty, "a pointer"));
        }
        let addr = Self::check_address(self.arg_address(index, kind), "argument")?;
        // SAFETY: pointer slots hold a pointer-sized integer.
        Ok(unsafe { ptr::read(addr as *const usize) } as *mut u8)
    }

    /// Read `this` for a value-type declaring type
    pub fn this<T: Copy + 'static>(&self) -> Result<T, Exception> {
        let ty = self.method.declaring_type();
        if !self.method.has_this() || !ty.is_rust_type::<T>() {
            return Err(Self::cast_error("this", ty, std::any::type_name::<T>()));
        }
        let addr = Self::check_address(self.target_address(), "this")?;
        // SAFETY: the target slot addresses a value of the declaring type.
        Ok(unsafe { ptr::read(addr as *const T) })
    }

    /// Mutable `this` for a value-type declaring type
    pub fn this_mut<T: Copy + 'static>(&mut self) -> Result<&mut T, Exception> {
        let ty = self.method.declaring_type();
        if !self.method.has_this() || !ty.is_rust_type::<T>() {
            return Err(Self::cast_error("this", ty, std::any::type_name::<T>()));
        }
        let addr = Self::check_address(self.target_address(), "this")?;
        // SAFETY: see `this`; exclusive through `&mut self`.
        Ok(unsafe { &mut *(addr as *mut T) })
    }

    /// `this` for a class declaring type
    pub fn this_object(&self) -> Result<ObjectRef, Exception> {
        let ty = self.method.declaring_type();
        if !self.method.has_this() || !ty.is_reference_type() {
            return Err(Self::cast_error("this", ty, "an object reference"));
        }
        let addr = Self::check_address(self.target_address(), "this")?;
        // SAFETY: class targets are addressed through their object slot.
        Ok(unsafe { ptr::read(addr as *const ObjectRef) })
    }

    fn return_slot(&self, accepts: impl Fn(ParameterKind) -> bool, what: &str) -> Result<ParameterKind, Exception> {
        match self.return_kind {
            Some(kind) if accepts(kind) => Ok(kind),
            _ => Err(Self::cast_error("return value", self.method.return_type(), what)),
        }
    }

    /// Write a value-type return
    pub fn set_return<T: Copy + 'static>(&mut self, value: T) -> Result<(), Exception> {
        let ty = self.method.return_type();
        let kind = self.return_slot(|k| k == ParameterKind::Value, std::any::type_name::<T>())?;
        if !ty.is_rust_type::<T>() {
            return Err(Self::cast_error("return value", ty, std::any::type_name::<T>()));
        }
        let addr = Self::check_address(self.return_address(kind), "return slot")?;
        // SAFETY: the return slot addresses storage of the return type.
        unsafe { ptr::write(addr as *mut T, value) };
        Ok(())
    }

    /// Write a reference return
    pub fn set_return_object(&mut self, value: ObjectRef) -> Result<(), Exception> {
        let ty = self.method.return_type();
        let kind = self.return_slot(|k| k == ParameterKind::Reference, "an object reference")?;
        if let Some(actual) = value.runtime_type() {
            if !ty.is_assignable_from(&actual) {
                return Err(Self::cast_error("value", &actual, ty.name()));
            }
        }
        let addr = Self::check_address(self.return_address(kind), "return slot")?;
        // SAFETY: reference returns are stored in an `ObjectRef` slot.
        unsafe { ptr::write(addr as *mut ObjectRef, value) };
        Ok(())
    }

    /// Write a nullable return
    pub fn set_return_nullable<T: Copy + 'static>(&mut self, value: Option<T>) -> Result<(), Exception> {
        let ty = self.method.return_type();
        let kind = self.return_slot(|k| k == ParameterKind::Nullable, "a nullable")?;
        let addr = Self::check_address(self.return_address(kind), "return slot")?;
        Self::write_nullable(ty, addr, value)
    }

    /// Write a pointer return
    pub fn set_return_pointer(&mut self, value: *mut u8) -> Result<(), Exception> {
        let kind = self.return_slot(|k| matches!(k, ParameterKind::Pointer(_)), "a pointer")?;
        let addr = Self::check_address(self.return_address(kind), "return slot")?;
        // SAFETY: pointer returns are stored as a pointer-sized integer.
        unsafe { ptr::write(addr as *mut usize, value as usize) };
        Ok(())
    }

    /// Return a reference to storage of the return type's element type.
    ///
    /// # Safety
    ///
    /// `location` must be null or point to a value of the element type that
    /// outlives the invocation context reading it.
    pub unsafe fn set_return_ref(&mut self, location: *mut u8) -> Result<(), Exception> {
        self.return_slot(|k| matches!(k, ParameterKind::ByRef(_)), "a by-ref")?;
        self.slots.set_address(Slot::Return, location);
        Ok(())
    }

    /// Return a reference to the storage behind by-ref argument `index`
    pub fn set_return_ref_to_arg(&mut self, index: usize) -> Result<(), Exception> {
        let ret_kind = self.return_slot(|k| matches!(k, ParameterKind::ByRef(_)), "a by-ref")?;
        let (kind, ty) = self.parameter(index)?;
        let ret_elem = self.method.return_type().element_type();
        if kind != ret_kind || ret_elem.map(|e| !e.same_as(ty)).unwrap_or(true) {
            return Err(Self::cast_error("argument", ty, self.method.return_type().name()));
        }
        let addr = self.arg_address(index, kind);
        self.slots.set_address(Slot::Return, addr);
        Ok(())
    }
}

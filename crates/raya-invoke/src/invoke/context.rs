//! Invocation context
//!
//! An [`InvokeContext`] owns the root registrations for one call's slot
//! storage. Callers bind arguments, the target and the return slot either as
//! objects or as references to their own storage, invoke one or more times,
//! and read results back through the same slots.
//!
//! The context is single-threaded (`!Send`, `!Sync`) and must outlive
//! nothing it borrows: caller storage bound by reference is borrowed for the
//! context's lifetime `'s`.

use std::any::type_name;
use std::cell::RefCell;
use std::ptr;

use smallvec::SmallVec;

use super::invoker::MethodInvoker;
use super::storage::{ArgumentStorage, Binding, FrameSlots, Slot};
use crate::error::{HeapError, InvokeError, InvokeResult};
use crate::gc::{Heap, ObjectRef, RootKind, RootScope};
use crate::types::{ParameterKind, PrimitiveKind, PrimitiveValue, SlotKind, TypeHandle};

/// Work left over from preparing a call
#[derive(Debug, Default)]
pub(crate) struct PreparedCall {
    /// Argument slots whose boxed value was copied into nullable storage
    materialized: SmallVec<[usize; 4]>,
}

/// Caller-side state for one invocation
pub struct InvokeContext<'s> {
    heap: &'s Heap,
    slots: FrameSlots<'s>,
    scope: Option<RootScope<'s>>,
    arg_count: usize,
    disposed: bool,
    /// Return type the caller declared up front, checked at invoke time
    expected_return: Option<TypeHandle>,
    /// Return type of the last method invoked through this context
    return_type: RefCell<Option<TypeHandle>>,
}

impl<'s> InvokeContext<'s> {
    /// Create a context over `storage` and register its slots as GC roots
    pub fn new(heap: &'s Heap, storage: &'s mut ArgumentStorage) -> Self {
        let storage: &'s ArgumentStorage = storage;
        let slots = storage.slots();
        slots.reset();

        let mut scope = RootScope::new(heap);
        let (objects, object_count) = slots.object_region();
        let (addresses, address_count) = slots.address_region();
        // SAFETY: both arrays live in `storage`, which is borrowed for 's and
        // outlives the scope. They are only written through `Cell`s.
        unsafe {
            scope.register(objects, object_count, RootKind::Object);
            scope.register(addresses, address_count, RootKind::Interior);
        }
        tracing::trace!(arg_count = storage.arg_count(), inline = storage.is_inline(), "invoke: context created");

        Self {
            heap,
            slots,
            scope: Some(scope),
            arg_count: storage.arg_count(),
            disposed: false,
            expected_return: None,
            return_type: RefCell::new(None),
        }
    }

    /// Create a context whose return slot must match `return_type`
    pub fn with_return_type(heap: &'s Heap, storage: &'s mut ArgumentStorage, return_type: &TypeHandle) -> Self {
        let mut ctx = Self::new(heap, storage);
        ctx.expected_return = Some(return_type.clone());
        ctx
    }

    /// Number of argument slots, 0 once disposed
    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    /// Whether [`dispose`](Self::dispose) has run
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Heap this context allocates from
    pub fn heap(&self) -> &'s Heap {
        self.heap
    }

    /// Return type declared at construction
    pub fn expected_return_type(&self) -> Option<&TypeHandle> {
        self.expected_return.as_ref()
    }

    /// Whether any slot is bound to caller storage, which forces the
    /// raw-address calling shape
    pub fn needs_by_ref(&self) -> bool {
        (0..self.arg_count)
            .map(Slot::Argument)
            .chain([Slot::Target, Slot::Return])
            .any(|slot| self.slots.binding(slot) == Binding::Address)
    }

    pub(crate) fn slots(&self) -> FrameSlots<'s> {
        self.slots
    }

    fn ensure_live(&self) -> InvokeResult<()> {
        if self.disposed {
            Err(InvokeError::ContextDisposed)
        } else {
            Ok(())
        }
    }

    fn argument_slot(&self, index: usize) -> InvokeResult<Slot> {
        self.ensure_live()?;
        if index >= self.arg_count {
            return Err(InvokeError::IndexOutOfRange {
                index,
                count: self.arg_count,
            });
        }
        Ok(Slot::Argument(index))
    }

    fn type_of<T: 'static>(&self) -> InvokeResult<TypeHandle> {
        self.heap
            .types()
            .of::<T>()
            .ok_or_else(|| HeapError::UnregisteredType(type_name::<T>()).into())
    }

    // ===== Binding =====

    /// Bind argument `index` to an object: a box for value types, a reference
    /// otherwise
    pub fn set_argument(&self, index: usize, value: ObjectRef) -> InvokeResult<()> {
        let slot = self.argument_slot(index)?;
        self.slots.bind_object(slot, value);
        Ok(())
    }

    /// Bind argument `index` to caller storage of a registered value type.
    /// The callee reads and writes `location` directly.
    pub fn set_argument_ref<T: Copy + 'static>(&self, index: usize, location: &'s mut T) -> InvokeResult<()> {
        let slot = self.argument_slot(index)?;
        let ty = self.type_of::<T>()?;
        self.slots.bind_address(slot, location as *mut T as *mut u8, ty);
        Ok(())
    }

    /// Bind argument `index` to a caller-held reference variable
    pub fn set_argument_object_ref(&self, index: usize, location: &'s mut ObjectRef) -> InvokeResult<()> {
        let slot = self.argument_slot(index)?;
        let object = self.heap.types().object().clone();
        self.slots.bind_address(slot, location as *mut ObjectRef as *mut u8, object);
        Ok(())
    }

    /// Bind argument `index` to raw storage holding a value of `ty`.
    ///
    /// # Safety
    ///
    /// `addr` must point to valid, aligned storage for `ty` that stays valid
    /// and is not accessed elsewhere while this context is alive.
    pub unsafe fn set_argument_ptr(&self, index: usize, addr: *mut u8, ty: &TypeHandle) -> InvokeResult<()> {
        let slot = self.argument_slot(index)?;
        self.slots.bind_address(slot, addr, ty.clone());
        Ok(())
    }

    /// Bind `this` to an object
    pub fn set_target(&self, value: ObjectRef) -> InvokeResult<()> {
        self.ensure_live()?;
        self.slots.bind_object(Slot::Target, value);
        Ok(())
    }

    /// Bind `this` to caller storage of a registered value type
    pub fn set_target_ref<T: Copy + 'static>(&self, location: &'s mut T) -> InvokeResult<()> {
        self.ensure_live()?;
        let ty = self.type_of::<T>()?;
        self.slots.bind_address(Slot::Target, location as *mut T as *mut u8, ty);
        Ok(())
    }

    /// Bind `this` to raw storage holding a value of `ty`.
    ///
    /// # Safety
    ///
    /// Same contract as [`set_argument_ptr`](Self::set_argument_ptr).
    pub unsafe fn set_target_ptr(&self, addr: *mut u8, ty: &TypeHandle) -> InvokeResult<()> {
        self.ensure_live()?;
        self.slots.bind_address(Slot::Target, addr, ty.clone());
        Ok(())
    }

    /// Pre-populate the return slot with an object
    pub fn set_return(&self, value: ObjectRef) -> InvokeResult<()> {
        self.ensure_live()?;
        self.slots.bind_object(Slot::Return, value);
        Ok(())
    }

    /// Have the callee write its return value into caller storage
    pub fn set_return_ref<T: Copy + 'static>(&self, location: &'s mut T) -> InvokeResult<()> {
        self.ensure_live()?;
        let ty = self.type_of::<T>()?;
        self.slots.bind_address(Slot::Return, location as *mut T as *mut u8, ty);
        Ok(())
    }

    /// Have the callee write its reference return into a caller variable
    pub fn set_return_object_ref(&self, location: &'s mut ObjectRef) -> InvokeResult<()> {
        self.ensure_live()?;
        let object = self.heap.types().object().clone();
        self.slots.bind_address(Slot::Return, location as *mut ObjectRef as *mut u8, object);
        Ok(())
    }

    /// Have the callee write its return value into raw storage of `ty`.
    ///
    /// # Safety
    ///
    /// Same contract as [`set_argument_ptr`](Self::set_argument_ptr).
    pub unsafe fn set_return_ptr(&self, addr: *mut u8, ty: &TypeHandle) -> InvokeResult<()> {
        self.ensure_live()?;
        self.slots.bind_address(Slot::Return, addr, ty.clone());
        Ok(())
    }

    // ===== Reading =====

    fn read_slot(&self, slot: Slot) -> InvokeResult<Option<ObjectRef>> {
        match self.slots.binding(slot) {
            Binding::Unset => Ok(None),
            Binding::Object => Ok(Some(self.slots.object(slot))),
            Binding::Address => {
                let addr = self.slots.address(slot);
                let Some(ty) = self.slots.recorded_type(slot) else {
                    return Ok(None);
                };
                if addr.is_null() {
                    return Ok(Some(ObjectRef::null()));
                }
                // SAFETY: address bindings point at live storage of the
                // recorded type, see the binding methods.
                Ok(Some(unsafe { self.heap.box_from_address(&ty, addr)? }))
            }
        }
    }

    /// Current value of argument `index` as an object. Storage bound by
    /// reference is boxed into a fresh copy.
    pub fn get_argument(&self, index: usize) -> InvokeResult<ObjectRef> {
        let slot = self.argument_slot(index)?;
        self.read_slot(slot)?.ok_or(InvokeError::ArgumentNotSet { index })
    }

    /// Current `this`, null when unbound
    pub fn get_target(&self) -> InvokeResult<ObjectRef> {
        self.ensure_live()?;
        Ok(self.read_slot(Slot::Target)?.unwrap_or_default())
    }

    fn ensure_returns(&self) -> InvokeResult<()> {
        let declared = self.return_type.borrow().clone().or_else(|| self.expected_return.clone());
        match declared {
            Some(ty) if ty.is_void() => Err(InvokeError::VoidReturn),
            _ => Ok(()),
        }
    }

    /// Return value as an object: the stored object, or a box of the value
    /// in caller-bound storage
    pub fn get_return(&self) -> InvokeResult<ObjectRef> {
        self.ensure_live()?;
        self.ensure_returns()?;
        self.read_slot(Slot::Return)?.ok_or(InvokeError::ReturnNotSet)
    }

    /// Return value read as a Rust value type
    pub fn return_value<T: Copy + 'static>(&self) -> InvokeResult<T> {
        self.ensure_live()?;
        self.ensure_returns()?;
        let mismatch = |actual: String| InvokeError::SlotTypeMismatch {
            requested: type_name::<T>(),
            actual,
        };

        let (addr, ty) = match self.slots.binding(Slot::Return) {
            Binding::Unset => return Err(InvokeError::ReturnNotSet),
            Binding::Object => {
                let obj = self.slots.object(Slot::Return);
                match obj.runtime_type() {
                    Some(ty) => (obj.payload(), ty),
                    None => return Err(mismatch("null".to_string())),
                }
            }
            Binding::Address => match self.slots.recorded_type(Slot::Return) {
                Some(ty) => (self.slots.address(Slot::Return), ty),
                None => return Err(InvokeError::ReturnNotSet),
            },
        };
        if addr.is_null() || !ty.is_rust_type::<T>() {
            return Err(mismatch(ty.name().to_string()));
        }
        // SAFETY: the storage holds a value whose runtime type was registered from `T`.
        Ok(unsafe { ptr::read(addr as *const T) })
    }

    // ===== Invocation =====

    /// Invoke with the current bindings. Exceptions thrown by the method are
    /// wrapped in [`InvokeError::TargetInvocation`].
    pub fn invoke(&self, invoker: &MethodInvoker) -> InvokeResult<()> {
        invoker.invoke_with_context(self)
    }

    /// Invoke with the current bindings, surfacing exceptions unwrapped as
    /// [`InvokeError::Thrown`]
    pub fn invoke_direct(&self, invoker: &MethodInvoker) -> InvokeResult<()> {
        invoker.invoke_with_context_direct(self)
    }

    /// Release the root registrations. Idempotent; later operations fail with
    /// [`InvokeError::ContextDisposed`].
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.arg_count = 0;
        self.scope = None;
        tracing::trace!("invoke: context disposed");
    }

    // ===== Preparation =====

    /// Validate the bindings against `invoker`'s method and fill every
    /// unbound slot with a default
    pub(crate) fn prepare(&self, invoker: &MethodInvoker) -> InvokeResult<PreparedCall> {
        self.ensure_live()?;
        let method = invoker.method();
        if self.arg_count != method.parameter_count() {
            return Err(InvokeError::ParameterCountMismatch {
                expected: method.parameter_count(),
                actual: self.arg_count,
            });
        }
        if let Some(expected) = &self.expected_return {
            if !expected.same_as(invoker.return_type()) {
                return Err(InvokeError::ReturnTypeMismatch {
                    expected: invoker.return_type().name().to_string(),
                    actual: expected.name().to_string(),
                });
            }
        }
        *self.return_type.borrow_mut() = Some(invoker.return_type().clone());

        let mut prepared = PreparedCall::default();
        if let Err(err) = self.prepare_slots(invoker, &mut prepared) {
            // Slots materialized before the failing check go back to the
            // caller's boxed values.
            if let Err(restore) = self.restore_nullables(&prepared) {
                tracing::warn!(error = %restore, "invoke: failed to restore nullable arguments");
            }
            return Err(err);
        }
        Ok(prepared)
    }

    fn prepare_slots(&self, invoker: &MethodInvoker, prepared: &mut PreparedCall) -> InvokeResult<()> {
        let method = invoker.method();
        for (index, (param, kind)) in method.parameters().iter().zip(invoker.parameter_kinds()).enumerate() {
            let slot = Slot::Argument(index);
            let ty = storage_type(param.ty(), *kind);
            match kind {
                ParameterKind::Value | ParameterKind::ByRef(SlotKind::Value) => self.prepare_value(slot, ty)?,
                ParameterKind::Reference | ParameterKind::ByRef(SlotKind::Reference) => {
                    self.prepare_reference(slot, ty, true)?
                }
                ParameterKind::Nullable | ParameterKind::ByRef(SlotKind::Nullable) => {
                    if self.prepare_nullable(slot, ty)? {
                        prepared.materialized.push(index);
                    }
                }
                ParameterKind::Pointer(_) => self.prepare_pointer(slot)?,
            }
        }

        if method.is_constructor() {
            self.prepare_constructor(invoker)?;
        } else {
            self.prepare_target(invoker)?;
            self.prepare_return(invoker)?;
        }
        Ok(())
    }

    fn mismatch(&self, slot: Slot, expected: &TypeHandle, actual: String) -> InvokeError {
        match slot {
            Slot::Argument(index) => InvokeError::ArgumentTypeMismatch {
                index,
                expected: expected.name().to_string(),
                actual,
            },
            Slot::Target => InvokeError::TargetMismatch {
                expected: expected.name().to_string(),
                actual,
            },
            Slot::Return => InvokeError::ReturnTypeMismatch {
                expected: expected.name().to_string(),
                actual,
            },
        }
    }

    fn recorded_name(&self, slot: Slot) -> String {
        self.slots
            .recorded_type(slot)
            .map(|t| t.name().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn prepare_value(&self, slot: Slot, ty: &TypeHandle) -> InvokeResult<()> {
        match self.slots.binding(slot) {
            Binding::Object if !self.slots.object(slot).is_null() => {
                let obj = self.slots.object(slot);
                if obj.type_id() != Some(ty.id()) {
                    return Err(self.mismatch(slot, ty, obj.type_name()));
                }
                self.slots.bind_object_as(slot, obj, Some(ty.clone()), true);
            }
            Binding::Address if !self.slots.address(slot).is_null() => {
                let same = self.slots.recorded_type(slot).is_some_and(|r| r.same_as(ty));
                if !same {
                    return Err(self.mismatch(slot, ty, self.recorded_name(slot)));
                }
            }
            _ => {
                let obj = self.heap.allocate_default(ty)?;
                self.slots.bind_object_as(slot, obj, Some(ty.clone()), true);
            }
        }
        Ok(())
    }

    fn prepare_reference(&self, slot: Slot, ty: &TypeHandle, check_assignable: bool) -> InvokeResult<()> {
        match self.slots.binding(slot) {
            Binding::Object => {
                let obj = self.slots.object(slot);
                if let Some(actual) = obj.runtime_type() {
                    if check_assignable && !ty.is_assignable_from(&actual) {
                        return Err(self.mismatch(slot, ty, actual.name().to_string()));
                    }
                }
                self.slots.bind_object_as(slot, obj, Some(ty.clone()), false);
            }
            Binding::Address if !self.slots.address(slot).is_null() => {
                let reference = self.slots.recorded_type(slot).is_some_and(|r| r.is_reference_type());
                if !reference {
                    return Err(self.mismatch(slot, ty, self.recorded_name(slot)));
                }
            }
            _ => self.slots.bind_object_as(slot, ObjectRef::null(), Some(ty.clone()), false),
        }
        Ok(())
    }

    /// Returns true when a boxed value was materialized into fresh nullable
    /// storage that must be reboxed after the call
    fn prepare_nullable(&self, slot: Slot, nullable: &TypeHandle) -> InvokeResult<bool> {
        match self.slots.binding(slot) {
            Binding::Address if !self.slots.address(slot).is_null() => {
                let same = self.slots.recorded_type(slot).is_some_and(|r| r.same_as(nullable));
                if !same {
                    return Err(self.mismatch(slot, nullable, self.recorded_name(slot)));
                }
                Ok(false)
            }
            Binding::Object => {
                let value = self.slots.object(slot);
                if let Some(actual) = value.runtime_type() {
                    let underlying = nullable.element_type().is_some_and(|e| e.same_as(&actual));
                    if !underlying {
                        return Err(self.mismatch(slot, nullable, actual.name().to_string()));
                    }
                }
                let storage = self.heap.allocate(nullable)?;
                // SAFETY: fresh storage of the nullable type; `value` is null
                // or a box of its element type, checked above.
                unsafe { self.heap.store_nullable(nullable, storage.payload(), value) };
                self.slots.bind_object_as(slot, storage, Some(nullable.clone()), true);
                Ok(true)
            }
            _ => {
                let storage = self.heap.allocate(nullable)?;
                self.slots.bind_object_as(slot, storage, Some(nullable.clone()), true);
                Ok(true)
            }
        }
    }

    fn prepare_pointer(&self, slot: Slot) -> InvokeResult<()> {
        let native = self.heap.types().primitive(PrimitiveKind::IntPtr).clone();
        let pointer_like = |ty: &TypeHandle| ty.is_native_int() || ty.is_pointer();
        match self.slots.binding(slot) {
            Binding::Object if !self.slots.object(slot).is_null() => {
                let obj = self.slots.object(slot);
                let ty = obj.runtime_type().filter(|t| pointer_like(t));
                match ty {
                    Some(ty) => self.slots.bind_object_as(slot, obj, Some(ty), true),
                    None => return Err(self.mismatch(slot, &native, obj.type_name())),
                }
            }
            Binding::Address if !self.slots.address(slot).is_null() => {
                if !self.slots.recorded_type(slot).is_some_and(|t| pointer_like(&t)) {
                    return Err(self.mismatch(slot, &native, self.recorded_name(slot)));
                }
            }
            _ => {
                let obj = self.heap.box_primitive(PrimitiveValue::IntPtr(0))?;
                self.slots.bind_object_as(slot, obj, Some(native), true);
            }
        }
        Ok(())
    }

    fn prepare_target(&self, invoker: &MethodInvoker) -> InvokeResult<()> {
        let method = invoker.method();
        if !method.has_this() {
            self.slots.clear(Slot::Target);
            return Ok(());
        }
        let declaring = method.declaring_type();
        let required = || InvokeError::TargetRequired {
            method: method.name().to_string(),
        };

        match self.slots.binding(Slot::Target) {
            Binding::Unset => Err(required()),
            Binding::Object => {
                let obj = self.slots.object(Slot::Target);
                let Some(actual) = obj.runtime_type() else {
                    return Err(required());
                };
                let value_type = declaring.is_value_type();
                let matches = if value_type {
                    declaring.same_as(&actual)
                } else {
                    declaring.is_assignable_from(&actual)
                };
                if !matches {
                    return Err(self.mismatch(Slot::Target, declaring, actual.name().to_string()));
                }
                self.slots.bind_object_as(Slot::Target, obj, Some(actual), value_type);
                Ok(())
            }
            Binding::Address => {
                if self.slots.address(Slot::Target).is_null() {
                    return Err(required());
                }
                let recorded = self.slots.recorded_type(Slot::Target);
                let matches = recorded.as_ref().is_some_and(|r| {
                    if declaring.is_value_type() {
                        declaring.same_as(r)
                    } else {
                        r.is_reference_type()
                    }
                });
                if !matches {
                    return Err(self.mismatch(Slot::Target, declaring, self.recorded_name(Slot::Target)));
                }
                Ok(())
            }
        }
    }

    fn prepare_return(&self, invoker: &MethodInvoker) -> InvokeResult<()> {
        let ret = invoker.return_type();
        let Some(kind) = invoker.return_kind() else {
            self.slots.clear(Slot::Return);
            return Ok(());
        };

        match kind {
            ParameterKind::Value => self.prepare_value(Slot::Return, ret),
            ParameterKind::Reference => self.prepare_reference(Slot::Return, ret, false),
            ParameterKind::Nullable => {
                if self.slots.binding(Slot::Return) == Binding::Address && !self.slots.address(Slot::Return).is_null() {
                    return self.prepare_nullable(Slot::Return, ret).map(|_| ());
                }
                // Returned nullables are reboxed after the call, so any
                // previous value is discarded.
                let storage = self.heap.allocate(ret)?;
                self.slots.bind_object_as(Slot::Return, storage, Some(ret.clone()), true);
                Ok(())
            }
            ParameterKind::Pointer(_) => self.prepare_pointer(Slot::Return),
            ParameterKind::ByRef(slot_kind) => {
                // The callee supplies the address; bind a default element so
                // the slot is never dangling.
                let elem = storage_type(ret, kind);
                let value = self.heap.allocate_default(elem)?;
                let payload = slot_kind != SlotKind::Reference;
                self.slots.bind_object_as(Slot::Return, value, Some(elem.clone()), payload);
                Ok(())
            }
        }
    }

    fn prepare_constructor(&self, invoker: &MethodInvoker) -> InvokeResult<()> {
        let declaring = invoker.method().declaring_type();
        if declaring.is_value_type() {
            let caller_storage = self.slots.binding(Slot::Return) == Binding::Address
                && !self.slots.address(Slot::Return).is_null()
                && self
                    .slots
                    .recorded_type(Slot::Return)
                    .is_some_and(|r| r.same_as(declaring));
            if caller_storage {
                self.slots
                    .bind_address(Slot::Target, self.slots.address(Slot::Return), declaring.clone());
                return Ok(());
            }
            let instance = self.heap.allocate(declaring)?;
            self.slots
                .bind_object_as(Slot::Return, instance, Some(declaring.clone()), true);
            self.slots
                .bind_object_as(Slot::Target, instance, Some(declaring.clone()), true);
        } else {
            let instance = self.heap.allocate(declaring)?;
            self.slots
                .bind_object_as(Slot::Return, instance, Some(declaring.clone()), false);
            self.slots
                .bind_object_as(Slot::Target, instance, Some(declaring.clone()), false);
        }
        tracing::trace!(ty = %declaring, "invoke: constructor instance allocated");
        Ok(())
    }

    // ===== Completion =====

    /// Rebox every nullable argument that was materialized for the call.
    /// Runs whether or not the call succeeded.
    pub(crate) fn restore_nullables(&self, prepared: &PreparedCall) -> InvokeResult<()> {
        for &index in &prepared.materialized {
            self.rebox_nullable(Slot::Argument(index))?;
        }
        Ok(())
    }

    fn rebox_nullable(&self, slot: Slot) -> InvokeResult<()> {
        let Some(ty) = self.slots.recorded_type(slot) else {
            return Ok(());
        };
        let storage = self.slots.object(slot);
        if storage.is_null() || !ty.is_nullable() {
            return Ok(());
        }
        // SAFETY: the slot holds a box of the nullable type it was prepared with.
        let value = unsafe { self.heap.box_from_address(&ty, storage.payload())? };
        self.slots.bind_object(slot, value);
        if value.is_null() {
            self.slots.set_recorded_type(slot, ty.element_type().cloned());
        }
        Ok(())
    }

    /// Post-process the return slot of a successful call
    pub(crate) fn complete(&self, invoker: &MethodInvoker) -> InvokeResult<()> {
        match invoker.return_kind() {
            Some(kind @ ParameterKind::ByRef(_)) => {
                let addr = self.slots.address(Slot::Return);
                if addr.is_null() {
                    return Err(InvokeError::NullRefReturned {
                        method: invoker.method().name().to_string(),
                    });
                }
                let elem = storage_type(invoker.return_type(), kind).clone();
                self.slots.rebind_as_address(Slot::Return, elem);
            }
            Some(ParameterKind::Nullable) if self.slots.binding(Slot::Return) == Binding::Object => {
                self.rebox_nullable(Slot::Return)?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl Drop for InvokeContext<'_> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Type of the storage a slot addresses: the element type for by-refs and
/// pointers, the parameter type otherwise
pub(crate) fn storage_type(ty: &TypeHandle, kind: ParameterKind) -> &TypeHandle {
    match kind {
        ParameterKind::ByRef(_) | ParameterKind::Pointer(_) => ty.element_type().unwrap_or(ty),
        _ => ty,
    }
}

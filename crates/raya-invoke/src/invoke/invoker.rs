//! Method invokers
//!
//! A [`MethodInvoker`] is the reusable, thread-safe handle for calling one
//! method late-bound. It precomputes the method's parameter kinds, carries
//! the interpreted-to-compiled strategy state, and lazily publishes one
//! compiled trampoline per calling shape.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::binding::{self, BindingFlags};
use super::context::InvokeContext;
use super::interpreter;
use super::storage::{ArgumentStorage, FrameSlots};
use super::strategy::{CallPhase, Strategy, StrategyState};
use crate::config::StrategyOverride;
use crate::error::{Exception, InvokeError, InvokeResult};
use crate::gc::{Heap, ObjectRef, RootKind, RootScope};
use crate::jit::{CompileError, CompiledInvoker, InvokerCompiler, TrampolineShape};
use crate::method::MethodDescriptor;
use crate::types::{ParameterKind, TypeHandle};

/// A lazily compiled trampoline for one shape
#[derive(Default)]
struct TrampolineSlot {
    code: OnceCell<CompiledInvoker>,
    /// Set once compilation failed; never retried
    unavailable: AtomicBool,
}

/// Reusable invoker for one method
pub struct MethodInvoker {
    method: Arc<MethodDescriptor>,
    heap: Arc<Heap>,
    compiler: Arc<dyn InvokerCompiler>,
    kinds: Arc<[ParameterKind]>,
    return_kind: Option<ParameterKind>,
    /// Type produced by a call: the declaring type for constructors
    return_type: TypeHandle,
    needs_by_ref: bool,
    strategy: StrategyState,
    trampolines: [TrampolineSlot; 2],
}

impl MethodInvoker {
    /// Create an invoker for `method`
    pub fn new(
        method: Arc<MethodDescriptor>,
        heap: Arc<Heap>,
        compiler: Arc<dyn InvokerCompiler>,
        policy: StrategyOverride,
    ) -> Self {
        let kinds: Arc<[ParameterKind]> = method.parameter_kinds().collect();
        let return_kind = ParameterKind::classify_return(method.return_type());
        let return_type = if method.is_constructor() {
            method.declaring_type().clone()
        } else {
            method.return_type().clone()
        };
        let needs_by_ref =
            kinds.iter().any(|k| k.needs_by_ref()) || return_kind.is_some_and(|k| k.needs_by_ref());

        tracing::debug!(method = %method, needs_by_ref, compiler = compiler.name(), "invoke: invoker created");
        Self {
            method,
            heap,
            compiler,
            kinds,
            return_kind,
            return_type,
            needs_by_ref,
            strategy: StrategyState::new(policy),
            trampolines: Default::default(),
        }
    }

    /// The invoked method
    pub fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    /// Heap used for boxing and defaults
    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }

    /// Marshaling kinds of the parameters
    pub fn parameter_kinds(&self) -> &[ParameterKind] {
        &self.kinds
    }

    /// Marshaling kind of the return value, `None` for void and constructors
    pub fn return_kind(&self) -> Option<ParameterKind> {
        self.return_kind
    }

    /// Type of the value a call produces
    pub fn return_type(&self) -> &TypeHandle {
        &self.return_type
    }

    /// Whether the method forces the raw-address calling shape
    pub fn needs_by_ref(&self) -> bool {
        self.needs_by_ref
    }

    /// Strategy flags and counters
    pub fn strategy_state(&self) -> &StrategyState {
        &self.strategy
    }

    /// Current dispatch strategy
    pub fn strategy(&self) -> Strategy {
        self.strategy.strategy()
    }

    /// Whether a trampoline for `shape` has been published
    pub fn has_trampoline(&self, shape: TrampolineShape) -> bool {
        self.trampolines[shape.index()].code.get().is_some()
    }

    fn check_parameter_count(&self, actual: usize) -> InvokeResult<()> {
        let expected = self.method.parameter_count();
        if actual != expected {
            return Err(InvokeError::ParameterCountMismatch { expected, actual });
        }
        Ok(())
    }

    // ===== Entry points =====

    /// Invoke with boxed arguments.
    ///
    /// Arguments are coerced to their parameter types (omitted ones take
    /// their defaults), by-ref results are written back into `args`, and the
    /// boxed return value is returned (null for void methods, the new
    /// instance for constructors).
    pub fn invoke(&self, target: ObjectRef, args: &mut [ObjectRef], flags: BindingFlags) -> InvokeResult<ObjectRef> {
        self.check_parameter_count(args.len())?;
        let args = Cell::from_mut(args).as_slice_of_cells();

        let mut roots = RootScope::new(&*self.heap);
        // SAFETY: `args` outlives `roots`, and from here on it is only
        // accessed through `Cell`s.
        unsafe { roots.register(args.as_ptr() as *const u8, args.len(), RootKind::Object) };

        let mut storage = ArgumentStorage::new(args.len());
        let ctx = InvokeContext::new(&self.heap, &mut storage);
        if self.method.has_this() && !self.method.is_constructor() {
            ctx.set_target(target)?;
        }
        binding::bind_arguments(self, &ctx, args, flags)?;

        let wrap = !flags.contains(BindingFlags::DO_NOT_WRAP_EXCEPTIONS);
        self.run(&ctx, wrap)?;
        binding::copy_back(self, &ctx, args)?;

        if self.return_type.is_void() {
            Ok(ObjectRef::null())
        } else {
            ctx.get_return()
        }
    }

    /// Invoke without argument coercion or exception wrapping
    pub fn invoke_direct(&self, target: ObjectRef, args: &mut [ObjectRef]) -> InvokeResult<ObjectRef> {
        self.invoke(
            target,
            args,
            BindingFlags::DO_NOT_WRAP_EXCEPTIONS | BindingFlags::EXACT_BINDING,
        )
    }

    /// Invoke using the bindings of a caller-managed context. Exceptions are
    /// wrapped in [`InvokeError::TargetInvocation`].
    pub fn invoke_with_context(&self, ctx: &InvokeContext<'_>) -> InvokeResult<()> {
        self.run(ctx, true)
    }

    /// Invoke using a caller-managed context, surfacing exceptions unwrapped
    pub fn invoke_with_context_direct(&self, ctx: &InvokeContext<'_>) -> InvokeResult<()> {
        self.run(ctx, false)
    }

    fn run(&self, ctx: &InvokeContext<'_>, wrap: bool) -> InvokeResult<()> {
        let prepared = ctx.prepare(self)?;
        let shape = if self.needs_by_ref || ctx.needs_by_ref() {
            TrampolineShape::ByRef
        } else {
            TrampolineShape::Boxed
        };

        let outcome = self.dispatch(ctx.slots(), shape);
        let restored = ctx.restore_nullables(&prepared);

        match outcome {
            Ok(()) => {
                restored?;
                ctx.complete(self)
            }
            Err(exception) => {
                tracing::debug!(method = %self.method, %exception, "invoke: target threw");
                if wrap {
                    Err(InvokeError::TargetInvocation(exception))
                } else {
                    Err(InvokeError::Thrown(exception))
                }
            }
        }
    }

    // ===== Dispatch =====

    fn dispatch(&self, slots: FrameSlots<'_>, shape: TrampolineShape) -> Result<(), Exception> {
        match self.select_trampoline(shape) {
            Some(code) => {
                tracing::trace!(method = %self.method, ?shape, "invoke: compiled dispatch");
                code.call(&self.heap, slots)
            }
            None => {
                tracing::trace!(method = %self.method, ?shape, "invoke: interpreted dispatch");
                interpreter::invoke_method(&self.heap, &self.method, slots, shape.frame_mode())
            }
        }
    }

    fn select_trampoline(&self, shape: TrampolineShape) -> Option<&CompiledInvoker> {
        match self.strategy.next_call() {
            CallPhase::Interpret | CallPhase::Settled(Strategy::InterpretedOnly) => None,
            CallPhase::Settled(_) => self.trampoline(shape),
            CallPhase::Determine => {
                let code = self.trampoline(shape);
                let target = if code.is_some() {
                    Strategy::Compiled
                } else {
                    Strategy::InterpretedOnly
                };
                let settled = self.strategy.settle(target);
                tracing::debug!(method = %self.method, strategy = ?settled, "invoke: strategy determined");
                match settled {
                    Strategy::Compiled => code,
                    _ => None,
                }
            }
        }
    }

    /// Compiled trampoline for `shape`, compiling on first request.
    /// Failures are cached per shape.
    fn trampoline(&self, shape: TrampolineShape) -> Option<&CompiledInvoker> {
        let slot = &self.trampolines[shape.index()];
        if let Some(code) = slot.code.get() {
            return Some(code);
        }
        if slot.unavailable.load(Ordering::Relaxed) {
            return None;
        }

        let attempt = self.strategy.record_compilation();
        match self.compiler.compile(&self.method, shape) {
            Ok(code) => {
                tracing::debug!(method = %self.method, ?shape, attempt, compiler = self.compiler.name(), "invoke: trampoline compiled");
                // A racing thread may have published first; either result is equivalent.
                Some(slot.code.get_or_init(|| code))
            }
            Err(err) => {
                slot.unavailable.store(true, Ordering::Relaxed);
                self.report_compile_failure(shape, &err);
                None
            }
        }
    }

    fn report_compile_failure(&self, shape: TrampolineShape, err: &CompileError) {
        if err.is_unsupported() {
            tracing::debug!(method = %self.method, ?shape, error = %err, "invoke: compilation unavailable, interpreting");
        } else {
            tracing::warn!(method = %self.method, ?shape, error = %err, "invoke: compilation failed, interpreting");
        }
    }
}

impl std::fmt::Debug for MethodInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodInvoker")
            .field("method", &self.method.name())
            .field("strategy", &self.strategy())
            .field("needs_by_ref", &self.needs_by_ref)
            .finish()
    }
}

//! Native-thunk compiler built on Cranelift
//!
//! For methods with a [`NativeEntry`](crate::method::NativeEntry), emits a
//! thunk that loads every argument through its slot address and calls the
//! entry point directly:
//!
//! ```text
//! thunk(entry, addrs, ret):
//!     a0 = load [addrs[0]]      ; or addrs[0] itself for by-refs and value `this`
//!     ...
//!     r = call_indirect entry(a0, ...)
//!     store r -> [ret]
//! ```
//!
//! Methods the thunk cannot express (no native entry, constructors, struct
//! or nullable values, by-ref returns) fall back to
//! [`SpecializingCompiler`](super::SpecializingCompiler).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use cranelift_codegen::ir::{types, AbiParam, InstBuilder, MemFlags, Signature, Type, UserFuncName};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Linkage, Module, ModuleError};
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::specialized::SpecializingCompiler;
use super::traits::*;
use crate::invoke::{FrameSlots, Slot};
use crate::method::MethodDescriptor;
use crate::types::{ParameterKind, PrimitiveKind, TypeHandle};

/// Thunk entry: `(native entry, argument addresses, return address)`
type ThunkFn = unsafe extern "C" fn(usize, *const *mut u8, *mut u8);

/// How one native argument is produced from its slot address
#[derive(Debug, Clone, Copy)]
enum Operand {
    /// Load a value of this type through the address
    Load(Type, Extension),
    /// Pass the address itself
    Address,
}

#[derive(Debug, Clone, Copy)]
enum Extension {
    Plain,
    Sign,
    Zero,
}

fn primitive_operand(kind: PrimitiveKind) -> Operand {
    match kind {
        PrimitiveKind::Boolean | PrimitiveKind::Byte => Operand::Load(types::I8, Extension::Zero),
        PrimitiveKind::SByte => Operand::Load(types::I8, Extension::Sign),
        PrimitiveKind::Char | PrimitiveKind::UInt16 => Operand::Load(types::I16, Extension::Zero),
        PrimitiveKind::Int16 => Operand::Load(types::I16, Extension::Sign),
        PrimitiveKind::Int32 | PrimitiveKind::UInt32 => Operand::Load(types::I32, Extension::Plain),
        PrimitiveKind::Int64 | PrimitiveKind::UInt64 => Operand::Load(types::I64, Extension::Plain),
        PrimitiveKind::Single => Operand::Load(types::F32, Extension::Plain),
        PrimitiveKind::Double => Operand::Load(types::F64, Extension::Plain),
        PrimitiveKind::IntPtr | PrimitiveKind::UIntPtr => Operand::Load(types::I64, Extension::Plain),
    }
}

/// Operand for a parameter, `None` when the thunk cannot pass it
fn parameter_operand(ty: &TypeHandle, kind: ParameterKind) -> Option<Operand> {
    match kind {
        ParameterKind::Value => ty.primitive().map(primitive_operand),
        ParameterKind::Reference | ParameterKind::Pointer(_) => Some(Operand::Load(types::I64, Extension::Plain)),
        ParameterKind::ByRef(_) => Some(Operand::Address),
        ParameterKind::Nullable => None,
    }
}

fn abi_param(operand: Operand) -> AbiParam {
    match operand {
        Operand::Load(ty, Extension::Sign) => AbiParam::new(ty).sext(),
        Operand::Load(ty, Extension::Zero) => AbiParam::new(ty).uext(),
        Operand::Load(ty, Extension::Plain) => AbiParam::new(ty),
        Operand::Address => AbiParam::new(types::I64),
    }
}

/// Native calling plan for one method
struct ThunkPlan {
    this: Option<Operand>,
    params: SmallVec<[Operand; 8]>,
    ret: Option<Operand>,
}

impl ThunkPlan {
    fn for_method(method: &MethodDescriptor) -> Option<Self> {
        if method.native_entry().is_none() || method.is_constructor() {
            return None;
        }
        let this = if method.has_this() {
            let declaring = method.declaring_type();
            Some(if declaring.is_value_type() {
                Operand::Address
            } else {
                Operand::Load(types::I64, Extension::Plain)
            })
        } else {
            None
        };

        let mut params = SmallVec::new();
        for param in method.parameters() {
            params.push(parameter_operand(param.ty(), ParameterKind::classify(param.ty()))?);
        }

        let ret = match ParameterKind::classify_return(method.return_type()) {
            None => None,
            Some(ParameterKind::ByRef(_)) => return None,
            Some(kind) => Some(parameter_operand(method.return_type(), kind)?),
        };
        Some(Self { this, params, ret })
    }

    fn operands(&self) -> impl Iterator<Item = Operand> + '_ {
        self.this.iter().copied().chain(self.params.iter().copied())
    }
}

/// Owns the JIT module backing every thunk it produced
struct ThunkModule {
    module: Mutex<JITModule>,
    next_id: AtomicU32,
}

// The module is only touched under its lock, and finalized code is never
// modified or freed while the module lives.
unsafe impl Send for ThunkModule {}
unsafe impl Sync for ThunkModule {}

/// Cranelift-backed compiler producing native call thunks
pub struct CraneliftCompiler {
    code: Arc<ThunkModule>,
    fallback: SpecializingCompiler,
}

impl CraneliftCompiler {
    /// Create a compiler targeting the host machine
    pub fn host() -> Result<Self, CompileError> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", "speed")
            .map_err(|e| CompileError::Backend(format!("Failed to set opt_level: {}", e)))?;
        let flags = settings::Flags::new(flag_builder);

        let isa = cranelift_native::builder()
            .map_err(|e| CompileError::Backend(format!("Failed to create native ISA builder: {}", e)))?
            .finish(flags)
            .map_err(|e| CompileError::Backend(format!("Failed to finish ISA: {}", e)))?;

        let builder = JITBuilder::with_isa(isa, default_libcall_names());
        Ok(Self {
            code: Arc::new(ThunkModule {
                module: Mutex::new(JITModule::new(builder)),
                next_id: AtomicU32::new(0),
            }),
            fallback: SpecializingCompiler,
        })
    }

    fn emit_thunk(&self, method: &MethodDescriptor, plan: &ThunkPlan) -> Result<ThunkFn, ModuleError> {
        let mut module = self.code.module.lock();
        let pointer = module.target_config().pointer_type();

        let mut native_sig = module.make_signature();
        for operand in plan.operands() {
            native_sig.params.push(abi_param(operand));
        }
        if let Some(ret) = plan.ret {
            native_sig.returns.push(abi_param(ret));
        }

        let mut thunk_sig: Signature = module.make_signature();
        thunk_sig.params.push(AbiParam::new(pointer)); // entry
        thunk_sig.params.push(AbiParam::new(pointer)); // argument addresses
        thunk_sig.params.push(AbiParam::new(pointer)); // return address

        let id = self.code.next_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("raya_invoke_thunk_{}_{}", method.name().replace(['<', '>', '.'], "_"), id);
        let func_id = module.declare_function(&name, Linkage::Local, &thunk_sig)?;

        let mut context = module.make_context();
        context.func.signature = thunk_sig;
        context.func.name = UserFuncName::user(0, func_id.as_u32());

        let mut builder_ctx = FunctionBuilderContext::new();
        {
            let mut builder = FunctionBuilder::new(&mut context.func, &mut builder_ctx);
            let block = builder.create_block();
            builder.append_block_params_for_function_params(block);
            builder.switch_to_block(block);
            builder.seal_block(block);

            let params = builder.block_params(block).to_vec();
            let (entry, addrs, ret_addr) = (params[0], params[1], params[2]);
            let word = pointer.bytes() as i32;

            let mut args = SmallVec::<[_; 8]>::new();
            for (i, operand) in plan.operands().enumerate() {
                let addr = builder.ins().load(pointer, MemFlags::trusted(), addrs, word * i as i32);
                let value = match operand {
                    Operand::Address => addr,
                    Operand::Load(ty, _) => builder.ins().load(ty, MemFlags::trusted(), addr, 0),
                };
                args.push(value);
            }

            let sig_ref = builder.import_signature(native_sig);
            let call = builder.ins().call_indirect(sig_ref, entry, &args);
            if plan.ret.is_some() {
                let result = builder.inst_results(call)[0];
                builder.ins().store(MemFlags::trusted(), result, ret_addr, 0);
            }
            builder.ins().return_(&[]);
            builder.finalize();
        }

        module.define_function(func_id, &mut context)?;
        module.clear_context(&mut context);
        module.finalize_definitions()?;

        let code = module.get_finalized_function(func_id);
        // SAFETY: the function was just defined with the `ThunkFn` signature.
        Ok(unsafe { std::mem::transmute::<*const u8, ThunkFn>(code) })
    }
}

impl InvokerCompiler for CraneliftCompiler {
    fn name(&self) -> &str {
        "cranelift"
    }

    fn compile(&self, method: &Arc<MethodDescriptor>, shape: TrampolineShape) -> Result<CompiledInvoker, CompileError> {
        let Some(plan) = ThunkPlan::for_method(method) else {
            return self.fallback.compile(method, shape);
        };
        let thunk = self
            .emit_thunk(method, &plan)
            .map_err(|e| CompileError::Backend(format!("Thunk compilation failed: {}", e)))?;
        tracing::debug!(method = %method, ?shape, "jit: native thunk compiled");

        let mode = shape.frame_mode();
        let method = method.clone();
        let kinds: Arc<[ParameterKind]> = method.parameter_kinds().collect();
        let ret_value_type = ParameterKind::classify_return(method.return_type())
            .map(|k| k.is_value_type())
            .unwrap_or(false);
        // Keeps the executable memory alive as long as the trampoline.
        let code = self.code.clone();

        let call = move |slots: FrameSlots<'_>| {
            let _code = &code;
            let mut addrs = SmallVec::<[*mut u8; 8]>::new();
            if method.has_this() {
                let value_type = method.declaring_type().is_value_type();
                addrs.push(slots.resolve(Slot::Target, mode, value_type));
            }
            for (i, kind) in kinds.iter().enumerate() {
                addrs.push(slots.resolve(Slot::Argument(i), mode, kind.is_value_type()));
            }
            let ret = slots.resolve(Slot::Return, mode, ret_value_type);
            let entry = method.native_entry().map(|e| e.address()).unwrap_or_default();
            // SAFETY: the slots were prepared for this method, so every
            // address points at storage of the operand's type, and `entry`
            // matches the signature promised by `NativeEntry::new`.
            unsafe { thunk(entry, addrs.as_ptr(), ret) };
        };

        Ok(CompiledInvoker::new(
            shape,
            Arc::new(move |_heap, slots| {
                call(slots);
                Ok(())
            }),
        ))
    }
}

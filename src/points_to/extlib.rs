//! Summaries for external library functions, keyed by name. A recognized
//! callee turns into a small constraint pattern; an unrecognized one makes
//! the caller fall back to the polluting treatment.

use crate::ir::{Constant, FuncId, Operand, ValueId};

use super::collect::Collector;
use super::{AnalysisError, ConstraintKind, NodeIndex, INVALID_INDEX};

/// Functions that induce no points-to constraints at all.
static NOOP_FUNCS: &[&str] = &[
    "log", "log10", "exp", "exp2", "exp10", "strcmp", "strncmp", "strlen", "atoi", "atof", "atol",
    "atoll", "remove", "unlink", "rename", "memcmp", "free", "execl", "execlp", "execle", "execv",
    "execvp", "chmod", "puts", "write", "open", "create", "truncate", "chdir", "mkdir", "rmdir",
    "read", "pipe", "wait", "time", "stat", "fstat", "lstat", "fopen", "fdopen", "fflush", "feof",
    "fileno", "clearerr", "rewind", "ftell", "ferror", "fgetc", "fwrite", "fread", "ungetc",
    "fputc", "fputs", "putc", "fseek", "fgetpos", "fsetpos", "printf", "fprintf", "sprintf",
    "vprintf", "vfprintf", "vsprintf", "scanf", "fscanf", "sscanf", "modf", "putchar", "isalnum",
    "isalpha", "isascii", "isatty", "isdigit", "isspace", "isupper", "islower", "sin", "cos",
    "sinf", "cosf", "asin", "acos", "tan", "atan", "fabs", "pow", "floor", "ceil", "sqrt",
    "sqrtf", "hypot", "random", "tolower", "toupper", "system", "clock", "exit", "abort",
    "gettimeofday", "settimeofday", "rand", "rand_r", "srand", "seed48", "drand48", "lrand48",
    "srand48", "memset", "llvm.memset.p0i8.i32", "llvm.memset.p0i8.i64", "llvm.lifetime.start",
    "llvm.lifetime.end", "llvm.stackrestore", "llvm.va_end", "__assert_fail",
];

/// Functions returning a fresh memory object.
static ALLOC_FUNCS: &[&str] = &[
    "malloc", "calloc", "valloc", "memalign", "aligned_alloc", "strdup", "strndup",
];

/// `realloc`-shaped: fresh object unless the first argument is null.
static REALLOC_FUNCS: &[&str] = &["realloc", "reallocf"];

static RET_ARG0_FUNCS: &[&str] = &[
    "fgets", "gets", "stpcpy", "strcat", "strchr", "strcpy", "strerror_r", "strncat", "strncpy",
    "strpbrk", "strptime", "strrchr", "strstr",
];

static RET_ARG2_FUNCS: &[&str] = &["freopen"];

static MEMCPY_FUNCS: &[&str] = &[
    "memcpy", "memmove", "memccpy", "bcopy", "llvm.memcpy.p0i8.p0i8.i32",
    "llvm.memcpy.p0i8.p0i8.i64", "llvm.memmove.p0i8.p0i8.i32", "llvm.memmove.p0i8.p0i8.i64",
];

/// `strto*`-shaped: may store a cursor through their second argument.
static CONVERT_FUNCS: &[&str] = &["strtod", "strtof", "strtol", "strtold", "strtoll", "strtoul"];

fn lookup(table: &[&str], name: &str) -> bool {
    table.iter().any(|entry| *entry == name)
}

impl Collector<'_> {
    /// Adds the constraints for a call to a declared (external) function.
    /// Returns false when the callee is unknown, so the caller escalates
    /// to the pollute path.
    pub(crate) fn add_constraints_for_external_library(
        &mut self,
        caller: FuncId,
        callsite: ValueId,
        dest: Option<NodeIndex>,
        callee: FuncId,
        args: &[Operand],
    ) -> Result<bool, AnalysisError> {
        let name = self.module.function(callee).name.as_str();

        if lookup(NOOP_FUNCS, name) {
            return Ok(true);
        }

        if lookup(ALLOC_FUNCS, name) {
            self.external_alloc(callsite, dest);
            return Ok(true);
        }

        if lookup(REALLOC_FUNCS, name) {
            if matches!(args.first(), Some(Operand::Const(Constant::Null))) {
                self.ret_arg(dest, args, 0)?;
            } else {
                self.external_alloc(callsite, dest);
            }
            return Ok(true);
        }

        if lookup(RET_ARG0_FUNCS, name) {
            self.ret_arg(dest, args, 0)?;
            return Ok(true);
        }

        if lookup(RET_ARG2_FUNCS, name) {
            self.ret_arg(dest, args, 2)?;
            return Ok(true);
        }

        if lookup(MEMCPY_FUNCS, name) {
            let (Some(dst_arg), Some(src_arg)) = (args.first(), args.get(1)) else {
                return Ok(false);
            };
            if !self.operand_is_pointer(dst_arg) || !self.operand_is_pointer(src_arg) {
                return Ok(false);
            }
            let dst = self.node_of_operand(dst_arg)?;
            let src = self.node_of_operand(src_arg)?;
            // Everything reachable through src flows into everything
            // reachable through dst, via a temporary.
            let temp = self.factory.create_value(None);
            self.emit(ConstraintKind::Load, temp, src);
            self.emit(ConstraintKind::Store, dst, temp);
            if let Some(d) = dest {
                self.emit(ConstraintKind::Copy, d, dst);
            }
            return Ok(true);
        }

        if lookup(CONVERT_FUNCS, name) {
            if let (Some(a0), Some(a1)) = (args.first(), args.get(1)) {
                if !matches!(a1, Operand::Const(Constant::Null))
                    && self.operand_is_pointer(a0)
                    && self.operand_is_pointer(a1)
                {
                    let d = self.node_of_operand(a0)?;
                    let s = self.node_of_operand(a1)?;
                    self.emit(ConstraintKind::Store, d, s);
                }
            }
            return Ok(true);
        }

        if name == "posix_memalign" {
            let Some(a0) = args.first() else {
                return Ok(false);
            };
            if !self.operand_is_pointer(a0) {
                // Ill-typed call; treat it as unknown.
                return Ok(false);
            }
            let out = self.node_of_operand(a0)?;
            let obj = self.create_heap_object(callsite, None);
            let temp = self.factory.create_value(None);
            self.emit(ConstraintKind::AddrOf, temp, obj);
            self.emit(ConstraintKind::Store, out, temp);
            return Ok(true);
        }

        if name == "va_start" || name == "llvm.va_start" {
            let Some(a0) = args.first() else {
                return Ok(false);
            };
            let arg = self.node_of_operand(a0)?;
            let va = self.factory.vararg_node_for(caller);
            if va == INVALID_INDEX {
                return Err(AnalysisError::InternalInvariant(
                    "va_start outside a variadic function".to_string(),
                ));
            }
            self.emit(ConstraintKind::AddrOf, arg, va);
            return Ok(true);
        }

        Ok(false)
    }

    fn ret_arg(
        &mut self,
        dest: Option<NodeIndex>,
        args: &[Operand],
        k: usize,
    ) -> Result<(), AnalysisError> {
        let (Some(d), Some(arg)) = (dest, args.get(k)) else {
            return Ok(());
        };
        if self.operand_is_pointer(arg) {
            let a = self.node_of_operand(arg)?;
            self.emit(ConstraintKind::Copy, d, a);
        }
        Ok(())
    }

    /// A fresh object run for a malloc-like callsite, sized from the
    /// callsite's pointee type when it has one.
    fn external_alloc(&mut self, callsite: ValueId, dest: Option<NodeIndex>) {
        let Some(d) = dest else {
            // The result is not a pointer (or unused); nothing escapes.
            return;
        };
        let pointee = self
            .module
            .value_type(callsite)
            .and_then(|t| t.pointee().cloned());
        let obj = self.create_heap_object(callsite, pointee.as_ref());
        self.emit(ConstraintKind::AddrOf, d, obj);
    }
}

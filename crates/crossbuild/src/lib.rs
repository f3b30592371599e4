//! Cross-compilation toolchain builder.
//!
//! Sequences the native build systems of binutils, gcc, the Linux kernel
//! headers and a C library (musl or glibc) into a single toolchain prefix.

pub mod builder;

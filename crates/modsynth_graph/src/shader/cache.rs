// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reference-counted registry of compiled programs.

use crate::backend::{CompileError, GpuBackend, ProgramHandle, ProgramLayout};
use crate::param::Params;
use crate::shader::library::LibraryId;
use indexmap::IndexMap;
use std::fmt;

pub(crate) const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

pub(crate) fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Structural fingerprint of a node program.
///
/// Only parameter names and kinds participate; values never do, so editing
/// a value re-renders with the same program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramSignature {
    /// Node function called by the entry point
    pub function: String,
    /// Library providing the function
    pub library: LibraryId,
    /// FNV-1a hash of the parameter declarations
    pub params_hash: u64,
}

impl ProgramSignature {
    /// Compute the signature of `function` from `library` over `params`
    pub fn new(function: impl Into<String>, library: LibraryId, params: &Params) -> Self {
        let params_hash = params.iter().fold(FNV_OFFSET, |hash, param| {
            let hash = fnv1a(hash, param.name().as_bytes());
            fnv1a(hash, &[0xff, param.kind().tag()])
        });
        Self {
            function: function.into(),
            library,
            params_hash,
        }
    }
}

impl fmt::Display for ProgramSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}@{:016x}", self.library, self.function, self.params_hash)
    }
}

#[derive(Debug)]
struct CachedProgram {
    handle: ProgramHandle,
    layout: ProgramLayout,
    refs: usize,
}

/// Program obtained from [`ProgramCache::acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredProgram {
    /// Backend program
    pub handle: ProgramHandle,
    /// Resource layout
    pub layout: ProgramLayout,
    /// Whether the program was already cached
    pub reused: bool,
}

/// Compiled programs shared by every node with the same signature
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: IndexMap<ProgramSignature, CachedProgram>,
}

impl ProgramCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference to the program for `signature`, compiling `source`
    /// on a miss. Failed compilations are not cached.
    pub fn acquire(
        &mut self,
        signature: &ProgramSignature,
        source: &str,
        layout: &ProgramLayout,
        backend: &mut dyn GpuBackend,
    ) -> Result<AcquiredProgram, CompileError> {
        if let Some(cached) = self.programs.get_mut(signature) {
            cached.refs += 1;
            tracing::debug!("Program cache hit for {signature} ({} refs)", cached.refs);
            return Ok(AcquiredProgram {
                handle: cached.handle,
                layout: cached.layout,
                reused: true,
            });
        }

        let handle = backend.compile(source, layout)?;
        tracing::info!("Compiled {signature} as {handle} on {}", backend.name());
        self.programs.insert(
            signature.clone(),
            CachedProgram {
                handle,
                layout: *layout,
                refs: 1,
            },
        );
        Ok(AcquiredProgram {
            handle,
            layout: *layout,
            reused: false,
        })
    }

    /// Drop one reference, releasing the backend program at zero
    pub fn release(&mut self, signature: &ProgramSignature, backend: &mut dyn GpuBackend) {
        let Some(cached) = self.programs.get_mut(signature) else {
            return;
        };
        cached.refs = cached.refs.saturating_sub(1);
        if cached.refs == 0 {
            if let Some(cached) = self.programs.shift_remove(signature) {
                tracing::debug!("Releasing {signature}");
                backend.release_program(cached.handle);
            }
        }
    }

    /// Number of references held on `signature`
    pub fn ref_count(&self, signature: &ProgramSignature) -> usize {
        self.programs.get(signature).map_or(0, |c| c.refs)
    }

    /// Number of live programs
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Check if no programs are cached
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Release every program regardless of reference counts
    pub fn clear(&mut self, backend: &mut dyn GpuBackend) {
        for (_, cached) in self.programs.drain(..) {
            backend.release_program(cached.handle);
        }
    }
}

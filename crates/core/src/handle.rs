// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// src/handle.rs
//
// Opaque handles for loader lifecycles. Callers hold a `LoaderHandle`;
// the registry owns the engine and checks liveness on every call.
//
use std::collections::HashMap;
use std::fmt;

use crate::error::{HandleError, LoaderError};

/// Lifecycle driven through a [`LoaderRegistry`].
pub trait LoaderEngine {
    type Output;

    fn next(&mut self) -> Result<Self::Output, LoaderError>;
    fn reset(&mut self) -> Result<(), LoaderError>;
    fn stop(&mut self) -> Result<(), LoaderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoaderHandle(u64);

impl LoaderHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LoaderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loader#{}", self.0)
    }
}

pub struct LoaderRegistry<E> {
    engines: HashMap<u64, E>,
    next_id: u64,
}

impl<E> fmt::Debug for LoaderRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("live", &self.engines.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl<E> Default for LoaderRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> LoaderRegistry<E> {
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn contains(&self, handle: LoaderHandle) -> bool {
        self.engines.contains_key(&handle.0)
    }
}

impl<E: LoaderEngine> LoaderRegistry<E> {
    /// Take ownership of `engine`. Handle ids are never reused.
    pub fn start(&mut self, engine: E) -> LoaderHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.engines.insert(id, engine);
        LoaderHandle(id)
    }

    pub fn get(&self, handle: LoaderHandle) -> Result<&E, HandleError> {
        self.engines
            .get(&handle.0)
            .ok_or(HandleError::Unknown(handle.0))
    }

    pub fn get_mut(&mut self, handle: LoaderHandle) -> Result<&mut E, HandleError> {
        self.engines
            .get_mut(&handle.0)
            .ok_or(HandleError::Unknown(handle.0))
    }

    pub fn next(&mut self, handle: LoaderHandle) -> Result<E::Output, HandleError> {
        self.get_mut(handle)?
            .next()
            .map_err(|source| HandleError::Engine {
                handle: handle.0,
                source,
            })
    }

    pub fn reset(&mut self, handle: LoaderHandle) -> Result<(), HandleError> {
        self.get_mut(handle)?
            .reset()
            .map_err(|source| HandleError::Engine {
                handle: handle.0,
                source,
            })
    }

    /// Stop the engine and drop it; the handle is dead afterwards even if
    /// the engine reports an error while stopping.
    pub fn stop(&mut self, handle: LoaderHandle) -> Result<(), HandleError> {
        let mut engine = self
            .engines
            .remove(&handle.0)
            .ok_or(HandleError::Unknown(handle.0))?;
        engine.stop().map_err(|source| HandleError::Engine {
            handle: handle.0,
            source,
        })
    }
}

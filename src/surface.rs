//! Surface registry
//!
//! Maps compositor surface ids to the process-local handles applications
//! hold, and tracks each surface through its lifecycle:
//! created (unconfigured) → configured → destroyed. Input is only ever
//! delivered to configured surfaces.

use log::debug;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Process-local surface handle given to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle(pub u64);

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Compositor-side surface identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    /// Created, waiting for the first configure
    Unconfigured,
    /// At least one configure acknowledged
    Configured,
}

/// Surface errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("Surface limit of {limit} reached")]
    TooManySurfaces { limit: usize },

    #[error("Surface {0} is not configured yet")]
    NotConfigured(SurfaceHandle),

    #[error("Compositor connection is gone")]
    Disconnected,
}

/// One tracked surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub handle: SurfaceHandle,
    pub id: SurfaceId,
    pub size: Size,
    pub state: SurfaceState,
    pub buffer_attached: bool,
}

impl Surface {
    pub fn is_configured(&self) -> bool {
        self.state == SurfaceState::Configured
    }
}

/// Two-way map between compositor ids and local handles
#[derive(Debug)]
pub struct SurfaceRegistry {
    surfaces: HashMap<SurfaceHandle, Surface>,
    by_id: HashMap<SurfaceId, SurfaceHandle>,
    next_handle: u64,
    limit: usize,
}

impl SurfaceRegistry {
    pub fn new(limit: usize) -> Self {
        Self {
            surfaces: HashMap::new(),
            by_id: HashMap::new(),
            next_handle: 1,
            limit,
        }
    }

    /// Fail fast before asking the compositor for another surface
    pub fn check_capacity(&self) -> Result<(), SurfaceError> {
        if self.surfaces.len() >= self.limit {
            return Err(SurfaceError::TooManySurfaces { limit: self.limit });
        }
        Ok(())
    }

    /// Track a surface the compositor just created
    pub fn insert(&mut self, id: SurfaceId, size: Size) -> Result<SurfaceHandle, SurfaceError> {
        self.check_capacity()?;

        let handle = SurfaceHandle(self.next_handle);
        self.next_handle += 1;
        self.surfaces.insert(
            handle,
            Surface {
                handle,
                id,
                size,
                state: SurfaceState::Unconfigured,
                buffer_attached: false,
            },
        );
        self.by_id.insert(id, handle);
        Ok(handle)
    }

    pub fn lookup(&self, id: SurfaceId) -> Option<SurfaceHandle> {
        self.by_id.get(&id).copied()
    }

    pub fn get(&self, handle: SurfaceHandle) -> Option<&Surface> {
        self.surfaces.get(&handle)
    }

    pub fn is_configured(&self, handle: SurfaceHandle) -> bool {
        self.get(handle).is_some_and(Surface::is_configured)
    }

    /// Apply a configure from the compositor.
    ///
    /// An empty size leaves the current size alone. Returns the surface's
    /// size after the configure.
    pub fn configure(&mut self, handle: SurfaceHandle, size: Size) -> Option<Size> {
        let surface = self.surfaces.get_mut(&handle)?;
        if !size.is_empty() {
            surface.size = size;
        }
        if surface.state == SurfaceState::Unconfigured {
            debug!("{} configured at {}x{}", handle, surface.size.width, surface.size.height);
        }
        surface.state = SurfaceState::Configured;
        Some(surface.size)
    }

    /// Record a new requested size; returns false if nothing changed
    pub fn resize(&mut self, handle: SurfaceHandle, size: Size) -> bool {
        match self.surfaces.get_mut(&handle) {
            Some(surface) if surface.size != size => {
                surface.size = size;
                true
            }
            _ => false,
        }
    }

    pub fn mark_buffer_attached(&mut self, handle: SurfaceHandle) -> Result<(), SurfaceError> {
        let surface = self
            .surfaces
            .get_mut(&handle)
            .ok_or(SurfaceError::NotConfigured(handle))?;
        if !surface.is_configured() {
            return Err(SurfaceError::NotConfigured(handle));
        }
        surface.buffer_attached = true;
        Ok(())
    }

    /// Stop tracking a surface. Returns None if it was already gone.
    pub fn remove(&mut self, handle: SurfaceHandle) -> Option<Surface> {
        let surface = self.surfaces.remove(&handle)?;
        self.by_id.remove(&surface.id);
        Some(surface)
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut registry = SurfaceRegistry::new(4);
        let handle = registry.insert(SurfaceId(7), Size::new(640, 480)).unwrap();

        assert_eq!(registry.lookup(SurfaceId(7)), Some(handle));
        assert!(!registry.is_configured(handle));

        assert_eq!(registry.configure(handle, Size::new(800, 600)), Some(Size::new(800, 600)));
        assert!(registry.is_configured(handle));

        // A zero-sized configure keeps the current size
        assert_eq!(registry.configure(handle, Size::new(0, 0)), Some(Size::new(800, 600)));

        assert!(registry.remove(handle).is_some());
        assert!(registry.remove(handle).is_none());
        assert_eq!(registry.lookup(SurfaceId(7)), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_limit_leaves_state_untouched() {
        let mut registry = SurfaceRegistry::new(1);
        let first = registry.insert(SurfaceId(1), Size::new(10, 10)).unwrap();

        assert_eq!(
            registry.insert(SurfaceId(2), Size::new(10, 10)),
            Err(SurfaceError::TooManySurfaces { limit: 1 })
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(SurfaceId(2)), None);

        registry.remove(first);
        assert!(registry.insert(SurfaceId(2), Size::new(10, 10)).is_ok());
    }

    #[test]
    fn test_handles_are_not_reused() {
        let mut registry = SurfaceRegistry::new(4);
        let first = registry.insert(SurfaceId(1), Size::default()).unwrap();
        registry.remove(first);
        let second = registry.insert(SurfaceId(1), Size::default()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_buffer_requires_configure() {
        let mut registry = SurfaceRegistry::new(4);
        let handle = registry.insert(SurfaceId(3), Size::new(1, 1)).unwrap();

        assert_eq!(
            registry.mark_buffer_attached(handle),
            Err(SurfaceError::NotConfigured(handle))
        );
        registry.configure(handle, Size::new(1, 1));
        registry.mark_buffer_attached(handle).unwrap();
        assert!(registry.get(handle).unwrap().buffer_attached);
    }

    #[test]
    fn test_resize_reports_changes_only() {
        let mut registry = SurfaceRegistry::new(4);
        let handle = registry.insert(SurfaceId(3), Size::new(100, 100)).unwrap();
        assert!(!registry.resize(handle, Size::new(100, 100)));
        assert!(registry.resize(handle, Size::new(200, 100)));
        assert_eq!(registry.get(handle).unwrap().size, Size::new(200, 100));
    }
}

//! Common utilities for texture lifecycle integration tests.
//!
//! Provides a [`TestContext`] that hides how each backend records and submits
//! commands, plus pixel pattern helpers.

use std::sync::Arc;

use texvault_graphics::backend::{CommandStream, DummyBackend, DummyLedger, DummyOptions};
use texvault_graphics::{GpuBackend, GraphicsResult};

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Available GPU backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy backend (no actual GPU operations).
    Dummy,
    /// Vulkan backend (native via ash).
    Vulkan,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            #[cfg(feature = "vulkan-backend")]
            Backend::Vulkan => true,
            #[cfg(not(feature = "vulkan-backend"))]
            Backend::Vulkan => false,
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

enum Submitter {
    Dummy(Arc<DummyBackend>),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(Arc<texvault_graphics::backend::vulkan::VulkanBackend>),
}

/// Test context owning one backend.
pub struct TestContext {
    #[allow(dead_code)]
    pub backend: Backend,
    submitter: Submitter,
}

impl TestContext {
    /// Create a context for `backend`.
    ///
    /// Returns `None` if the backend is not compiled in or no device exists.
    pub fn new(backend: Backend) -> Option<Self> {
        if !backend.is_available() {
            return None;
        }
        let _ = env_logger::builder().is_test(true).try_init();

        let submitter = match backend {
            Backend::Dummy => Submitter::Dummy(Arc::new(DummyBackend::new())),
            #[cfg(feature = "vulkan-backend")]
            Backend::Vulkan => {
                let vulkan = texvault_graphics::backend::vulkan::VulkanBackend::new(false).ok()?;
                Submitter::Vulkan(Arc::new(vulkan))
            }
            #[cfg(not(feature = "vulkan-backend"))]
            Backend::Vulkan => return None,
        };
        Some(Self { backend, submitter })
    }

    /// Dummy context with custom options.
    #[allow(dead_code)]
    pub fn dummy_with(options: DummyOptions) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            backend: Backend::Dummy,
            submitter: Submitter::Dummy(Arc::new(DummyBackend::with_options(options))),
        }
    }

    /// The backend as a trait object.
    pub fn gpu(&self) -> Arc<dyn GpuBackend> {
        match &self.submitter {
            Submitter::Dummy(backend) => backend.clone(),
            #[cfg(feature = "vulkan-backend")]
            Submitter::Vulkan(backend) => backend.clone(),
        }
    }

    /// The dummy ledger, when running on the dummy backend.
    #[allow(dead_code)]
    pub fn ledger(&self) -> Option<Arc<DummyLedger>> {
        match &self.submitter {
            Submitter::Dummy(backend) => Some(backend.ledger().clone()),
            #[cfg(feature = "vulkan-backend")]
            Submitter::Vulkan(_) => None,
        }
    }

    /// Record commands and, on a real device, submit them and wait.
    pub fn record(
        &self,
        record: impl FnOnce(&mut CommandStream) -> GraphicsResult<()>,
    ) -> GraphicsResult<()> {
        match &self.submitter {
            Submitter::Dummy(backend) => record(&mut backend.command_stream()),
            #[cfg(feature = "vulkan-backend")]
            Submitter::Vulkan(backend) => backend.submit_and_wait(record),
        }
    }
}

// ============================================================================
// Pixel Helpers
// ============================================================================

/// RGBA8888 gradient with a distinct value in every pixel.
#[allow(dead_code)]
pub fn gradient_rgba(width: u32, height: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = (x * 255 / width) as u8;
            let g = (y * 255 / height) as u8;
            data.extend_from_slice(&[r, g, 0x40, 0xff]);
        }
    }
    data
}

/// Solid 16-bit pixels.
#[allow(dead_code)]
pub fn solid_16bit(width: u32, height: u32, pixel: u16) -> Vec<u8> {
    pixel.to_le_bytes().repeat((width * height) as usize)
}

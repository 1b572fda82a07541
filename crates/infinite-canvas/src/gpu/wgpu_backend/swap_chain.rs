use std::cell::RefCell;
use std::rc::Rc;

use crate::gpu::{SharedDevice, SwapChain, Texture};

use super::device::WgpuDevice;
use super::surface::SurfaceState;

/// Swap chain over a wgpu surface.
pub struct WgpuSwapChain {
    device: wgpu::Device,
    surface: Rc<RefCell<SurfaceState>>,
    shared: Rc<RefCell<WgpuDevice>>,
}

impl WgpuSwapChain {
    pub(super) fn new(
        device: wgpu::Device,
        surface: Rc<RefCell<SurfaceState>>,
        shared: Rc<RefCell<WgpuDevice>>,
    ) -> Self {
        Self {
            device,
            surface,
            shared,
        }
    }
}

impl SwapChain for WgpuSwapChain {
    fn configure(&mut self, width: u32, height: u32) {
        log::debug!("configuring surface to {width}x{height}");
        self.surface.borrow_mut().configure(&self.device, width, height);
    }

    fn canvas_size(&self) -> (u32, u32) {
        self.surface.borrow().size()
    }

    fn onscreen_texture(&mut self) -> Option<Texture> {
        self.surface
            .borrow_mut()
            .acquire(&self.device)
            .then_some(Texture::ONSCREEN)
    }

    fn device(&self) -> SharedDevice {
        self.shared.clone()
    }
}

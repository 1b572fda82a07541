/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); the canvas cannot present anymore.
    Fatal,
}

/// Surface, its configuration and the texture acquired for the current frame.
///
/// Shared between the swap chain (configure/acquire) and the device
/// (resolve/present).
pub(super) struct SurfaceState {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    /// Requested drawable size in physical pixels; may be 0x0.
    size: (u32, u32),
    configured: bool,
    current: Option<wgpu::SurfaceTexture>,
}

/// What the canvas asks of its surface. Requests the surface does not
/// list in its capabilities are replaced by ones it does.
#[derive(Debug, Clone)]
pub(super) struct SurfacePreferences {
    pub(super) srgb: bool,
    pub(super) present_mode: wgpu::PresentMode,
    pub(super) alpha_mode: Option<wgpu::CompositeAlphaMode>,
    pub(super) frame_latency: u32,
}

/// Builds the surface configuration for a `width`x`height` drawable.
///
/// Returns `None` when the surface reports no formats at all, i.e. it is
/// not usable with the adapter.
pub(super) fn negotiate_config(
    caps: &wgpu::SurfaceCapabilities,
    preferences: &SurfacePreferences,
    width: u32,
    height: u32,
) -> Option<wgpu::SurfaceConfiguration> {
    let format = caps
        .formats
        .iter()
        .find(|format| format.is_srgb() == preferences.srgb)
        .or_else(|| caps.formats.first())
        .copied()?;

    let present_mode = if caps.present_modes.contains(&preferences.present_mode) {
        preferences.present_mode
    } else {
        wgpu::PresentMode::Fifo
    };

    let alpha_mode = match preferences.alpha_mode {
        Some(mode) if caps.alpha_modes.contains(&mode) => mode,
        _ => caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto),
    };

    // Copy-capable surfaces take the offscreen target by copy; the rest
    // (GL) are resolved by drawing into them.
    let usage = (caps.usages & wgpu::TextureUsages::COPY_DST) | wgpu::TextureUsages::RENDER_ATTACHMENT;

    Some(wgpu::SurfaceConfiguration {
        usage,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: preferences.frame_latency,
    })
}

impl SurfaceState {
    /// Negotiates a configuration against the adapter's capabilities and
    /// configures the surface for the canvas' current size.
    pub(super) fn negotiate(
        surface: wgpu::Surface<'static>,
        adapter: &wgpu::Adapter,
        device: &wgpu::Device,
        preferences: &SurfacePreferences,
        (width, height): (u32, u32),
    ) -> Option<Self> {
        let caps = surface.get_capabilities(adapter);
        let config = negotiate_config(&caps, preferences, width, height)?;
        log::debug!(
            "surface {:?} {:?} {:?} usage {:?}",
            config.format,
            config.present_mode,
            config.alpha_mode,
            config.usage
        );

        let mut state = Self::new(surface, config);
        state.configure(device, width, height);
        Some(state)
    }

    pub(super) fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    fn new(surface: wgpu::Surface<'static>, config: wgpu::SurfaceConfiguration) -> Self {
        Self {
            surface,
            size: (config.width, config.height),
            config,
            configured: false,
            current: None,
        }
    }

    #[inline]
    pub(super) fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Reconfigures the surface.
    ///
    /// wgpu does not support configuring a surface with a 0x0 size; in that
    /// case only the requested size is recorded and configuration is deferred.
    pub(super) fn configure(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.size = (width, height);
        if width == 0 || height == 0 {
            return;
        }

        self.current = None;
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(device, &self.config);
        self.configured = true;
    }

    /// Acquires the frame's surface texture unless one is already held.
    pub(super) fn acquire(&mut self, device: &wgpu::Device) -> bool {
        if self.current.is_some() {
            return true;
        }
        if !self.configured {
            return false;
        }

        match self.surface.get_current_texture() {
            Ok(texture) => {
                self.current = Some(texture);
                true
            }
            Err(err) => {
                let action = self.handle_error(device, err);
                log::warn!("surface texture unavailable ({action:?})");
                false
            }
        }
    }

    pub(super) fn current(&self) -> Option<&wgpu::SurfaceTexture> {
        self.current.as_ref()
    }

    /// Presents the acquired texture, if any.
    pub(super) fn present(&mut self) {
        if let Some(frame) = self.current.take() {
            frame.present();
        }
    }

    pub(super) fn release(&mut self) {
        self.current = None;
    }

    fn handle_error(&mut self, device: &wgpu::Device, err: wgpu::SurfaceError) -> SurfaceErrorAction {
        match err {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                if self.size.0 > 0 && self.size.1 > 0 {
                    self.surface.configure(device, &self.config);
                }
                SurfaceErrorAction::Reconfigured
            }
            wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
            wgpu::SurfaceError::Timeout => SurfaceErrorAction::SkipFrame,
            wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
        }
    }
}

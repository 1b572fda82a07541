use winit::window::Window;

/// Host capabilities the canvas may query.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Environment {
    /// Pixel ratio reported by the host, if it reports one.
    pub reported_pixel_ratio: Option<f32>,
    pub is_browser: bool,
}

impl Environment {
    pub fn from_window(window: &Window) -> Self {
        Self {
            reported_pixel_ratio: Some(window.scale_factor() as f32),
            is_browser: cfg!(target_arch = "wasm32"),
        }
    }

    /// Effective device pixel ratio: `configured`, else the reported ratio,
    /// else 1.0. Non-finite and non-positive values count as unset.
    pub fn resolve_pixel_ratio(&self, configured: Option<f32>) -> f32 {
        let valid = |ratio: &f32| ratio.is_finite() && *ratio > 0.0;
        configured
            .filter(valid)
            .or(self.reported_pixel_ratio.filter(valid))
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_ratio_wins() {
        let env = Environment {
            reported_pixel_ratio: Some(3.0),
            is_browser: true,
        };
        assert_eq!(env.resolve_pixel_ratio(Some(2.0)), 2.0);
    }

    #[test]
    fn falls_back_to_reported_then_one() {
        let env = Environment {
            reported_pixel_ratio: Some(1.5),
            is_browser: true,
        };
        assert_eq!(env.resolve_pixel_ratio(None), 1.5);
        assert_eq!(Environment::default().resolve_pixel_ratio(None), 1.0);
    }

    #[test]
    fn invalid_ratios_are_ignored() {
        let env = Environment {
            reported_pixel_ratio: Some(f32::NAN),
            is_browser: false,
        };
        assert_eq!(env.resolve_pixel_ratio(Some(0.0)), 1.0);
        assert_eq!(env.resolve_pixel_ratio(Some(-2.0)), 1.0);
    }
}

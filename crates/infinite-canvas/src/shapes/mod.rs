//! Drawable shapes.
//!
//! Each shape owns its own device resources, creates them lazily on first
//! render and releases them in `destroy`.

mod circle;

use std::cell::RefCell;
use std::rc::Rc;

use crate::gpu::{Buffer, RenderPass, SharedDevice};

pub use circle::{AntiAliasingType, Circle, CircleConfig};

/// Contract between a shape and the renderer plugin.
pub trait Renderable {
    /// Records the shape's draw into `pass`. `frame_uniforms` holds the
    /// logical canvas size shared by every shape of the frame.
    fn render(&mut self, device: &SharedDevice, pass: RenderPass, frame_uniforms: Buffer);

    /// Releases every device resource the shape owns. Later calls are no-ops.
    fn destroy(&mut self);

    /// Whether attribute changes are waiting to be uploaded.
    fn is_render_dirty(&self) -> bool;
}

/// A shape held by the canvas.
#[derive(Debug)]
pub enum Shape {
    Circle(Circle),
}

/// Shapes are shared between the host and the canvas; identity is the
/// allocation (`Rc::ptr_eq`).
pub type SharedShape = Rc<RefCell<Shape>>;

impl Shape {
    pub fn into_shared(self) -> SharedShape {
        Rc::new(RefCell::new(self))
    }

    pub fn as_circle(&self) -> Option<&Circle> {
        match self {
            Shape::Circle(circle) => Some(circle),
        }
    }

    pub fn as_circle_mut(&mut self) -> Option<&mut Circle> {
        match self {
            Shape::Circle(circle) => Some(circle),
        }
    }
}

impl From<Circle> for Shape {
    fn from(circle: Circle) -> Self {
        Shape::Circle(circle)
    }
}

impl Renderable for Shape {
    fn render(&mut self, device: &SharedDevice, pass: RenderPass, frame_uniforms: Buffer) {
        match self {
            Shape::Circle(circle) => circle.render(device, pass, frame_uniforms),
        }
    }

    fn destroy(&mut self) {
        match self {
            Shape::Circle(circle) => circle.destroy(),
        }
    }

    fn is_render_dirty(&self) -> bool {
        match self {
            Shape::Circle(circle) => circle.is_render_dirty(),
        }
    }
}

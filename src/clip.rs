//! Page windows over the mounted preview.
//!
//! A clip is two style changes applied together: the wrapper gets a fixed
//! height with hidden overflow, and the content root is shifted up by the
//! page start. Resetting unsets both.

use crate::canvas::Scene;
use std::ops::{Deref, DerefMut};

pub trait ClipControl {
    fn set_clip(&mut self, start_y: f32, height: f32);
    fn reset_clip(&mut self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WrapperStyle {
    pub height: Option<f32>,
    pub overflow_hidden: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContentStyle {
    /// Vertical shift of the content root; negative moves it up.
    pub translate_y: Option<f32>,
}

/// The capture surface: a clip wrapper around the composed content root.
#[derive(Debug, Default)]
pub struct TargetSurface {
    scene: Option<Scene>,
    wrapper: WrapperStyle,
    content: ContentStyle,
}

impl TargetSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&mut self, scene: Scene) {
        self.scene = Some(scene);
    }

    pub fn unmount(&mut self) -> Option<Scene> {
        self.wrapper = WrapperStyle::default();
        self.content = ContentStyle::default();
        self.scene.take()
    }

    pub fn is_mounted(&self) -> bool {
        self.scene.is_some()
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn wrapper_style(&self) -> WrapperStyle {
        self.wrapper
    }

    pub fn content_style(&self) -> ContentStyle {
        self.content
    }

    pub fn is_clipped(&self) -> bool {
        self.wrapper.height.is_some()
    }

    /// Start and height of what the wrapper currently shows.
    pub fn visible_window(&self) -> Option<(f32, f32)> {
        let scene = self.scene.as_ref()?;
        let start = -self.content.translate_y.unwrap_or(0.0);
        let height = self.wrapper.height.unwrap_or(scene.size.height);
        Some((start, height))
    }
}

impl ClipControl for TargetSurface {
    fn set_clip(&mut self, start_y: f32, height: f32) {
        if self.scene.is_none() {
            return;
        }
        self.wrapper = WrapperStyle {
            height: Some(height),
            overflow_hidden: true,
        };
        self.content = ContentStyle {
            translate_y: Some(-start_y),
        };
    }

    fn reset_clip(&mut self) {
        if self.scene.is_none() {
            return;
        }
        self.wrapper = WrapperStyle::default();
        self.content = ContentStyle::default();
    }
}

/// Holds a clip for its lifetime and resets it on drop, whatever happens
/// while the page is being encoded.
pub struct ClipGuard<'a, T: ClipControl + ?Sized> {
    target: &'a mut T,
}

impl<'a, T: ClipControl + ?Sized> ClipGuard<'a, T> {
    pub fn new(target: &'a mut T, start_y: f32, height: f32) -> Self {
        target.set_clip(start_y, height);
        Self { target }
    }
}

impl<T: ClipControl + ?Sized> Deref for ClipGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.target
    }
}

impl<T: ClipControl + ?Sized> DerefMut for ClipGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.target
    }
}

impl<T: ClipControl + ?Sized> Drop for ClipGuard<'_, T> {
    fn drop(&mut self) {
        self.target.reset_clip();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Size;

    fn mounted() -> TargetSurface {
        let mut surface = TargetSurface::new();
        surface.mount(Scene::empty(Size::new(1920.0, 2000.0)));
        surface
    }

    #[test]
    fn set_then_reset_restores_natural_styles() {
        let mut surface = mounted();
        let before = (surface.wrapper_style(), surface.content_style());

        surface.set_clip(920.0, 1000.0);
        assert_eq!(
            surface.wrapper_style(),
            WrapperStyle {
                height: Some(1000.0),
                overflow_hidden: true
            }
        );
        assert_eq!(surface.content_style().translate_y, Some(-920.0));
        assert_eq!(surface.visible_window(), Some((920.0, 1000.0)));

        surface.reset_clip();
        assert_eq!((surface.wrapper_style(), surface.content_style()), before);
        assert_eq!(surface.visible_window(), Some((0.0, 2000.0)));
    }

    #[test]
    fn clip_calls_are_idempotent() {
        let mut surface = mounted();
        surface.set_clip(10.0, 20.0);
        surface.set_clip(10.0, 20.0);
        assert_eq!(surface.visible_window(), Some((10.0, 20.0)));
        surface.reset_clip();
        surface.reset_clip();
        assert!(!surface.is_clipped());
    }

    #[test]
    fn unmounted_surface_ignores_clips() {
        let mut surface = TargetSurface::new();
        surface.set_clip(100.0, 100.0);
        assert!(!surface.is_clipped());
        assert_eq!(surface.visible_window(), None);
    }

    #[test]
    fn guard_resets_on_drop() {
        let mut surface = mounted();
        {
            let guard = ClipGuard::new(&mut surface, 1840.0, 160.0);
            assert_eq!(guard.visible_window(), Some((1840.0, 160.0)));
        }
        assert!(!surface.is_clipped());
        assert_eq!(surface.content_style(), ContentStyle::default());
    }
}

//! Keyboard mapping for view navigation.

use glam::Vec2;

use crate::compute::DispatchParameters;

/// Pan step as a fraction of the current zoom.
pub const MOVE_SPEED: f32 = 0.05;
/// Zoom factor per key press.
pub const ZOOM_SPEED: f32 = 1.05;
/// Iteration bound change per key press.
pub const ITERATION_STEP: u32 = 10;

/// Stored views: (zoom, center).
pub const PRESETS: [(f32, [f32; 2]); 6] = [
    (3.0, [-0.75, 0.0]),
    (0.000005, [0.241550, 0.568976]),
    (0.000009, [0.347425, -0.581360]),
    (0.000005, [-1.942068, 0.000409]),
    (0.000005, [-0.786518, 0.165409]),
    (0.000005, [-0.742016, 0.245320]),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    PanLeft,
    PanRight,
    PanDown,
    PanUp,
    ZoomIn,
    ZoomOut,
    Preset(usize),
    MoreIterations,
    FewerIterations,
    ToggleFullscreen,
    RebuildKernel,
    Quit,
}

/// What the window has to do after an action was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    None,
    ToggleFullscreen,
    RebuildKernel,
    Quit,
}

/// Key binding table.
pub fn action_for(key: egui::Key) -> Option<Action> {
    use egui::Key;
    Some(match key {
        Key::A => Action::PanLeft,
        Key::D => Action::PanRight,
        Key::S => Action::PanDown,
        Key::W => Action::PanUp,
        Key::Z => Action::ZoomIn,
        Key::U => Action::ZoomOut,
        Key::Num0 => Action::Preset(0),
        Key::Num1 => Action::Preset(1),
        Key::Num2 => Action::Preset(2),
        Key::Num3 => Action::Preset(3),
        Key::Num4 => Action::Preset(4),
        Key::Num5 => Action::Preset(5),
        Key::Plus | Key::Equals => Action::MoreIterations,
        Key::Minus => Action::FewerIterations,
        Key::F => Action::ToggleFullscreen,
        Key::R => Action::RebuildKernel,
        Key::Escape => Action::Quit,
        _ => return None,
    })
}

/// Apply `action` to the view. Parameter changes set the dirty flag.
pub fn apply(action: Action, params: &mut DispatchParameters) -> Effect {
    let step = MOVE_SPEED;
    match action {
        Action::PanLeft => params.pan(Vec2::new(-step, 0.0)),
        Action::PanRight => params.pan(Vec2::new(step, 0.0)),
        Action::PanDown => params.pan(Vec2::new(0.0, -step)),
        Action::PanUp => params.pan(Vec2::new(0.0, step)),
        Action::ZoomIn => params.set_zoom(params.zoom() / ZOOM_SPEED),
        Action::ZoomOut => params.set_zoom(params.zoom() * ZOOM_SPEED),
        Action::Preset(i) => {
            if let Some(&(zoom, [x, y])) = PRESETS.get(i) {
                params.set_view(Vec2::new(x, y), zoom);
            }
        }
        Action::MoreIterations => {
            params.set_max_iterations(params.max_iterations().saturating_add(ITERATION_STEP))
        }
        Action::FewerIterations => {
            let n = params.max_iterations().saturating_sub(ITERATION_STEP).max(1);
            params.set_max_iterations(n)
        }
        Action::ToggleFullscreen => return Effect::ToggleFullscreen,
        Action::RebuildKernel => return Effect::RebuildKernel,
        Action::Quit => return Effect::Quit,
    }
    Effect::None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean() -> DispatchParameters {
        let mut p = DispatchParameters::default();
        p.mark_bound();
        p
    }

    #[test]
    fn test_pan_scales_with_zoom() {
        let mut p = clean();
        assert_eq!(apply(Action::PanRight, &mut p), Effect::None);
        assert!(p.is_dirty());
        assert!((p.center().x - (-0.75 + 0.05 * 3.0)).abs() < 1e-6);

        let mut p = clean();
        apply(Action::PanDown, &mut p);
        assert!((p.center().y + 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_zoom_keys() {
        let mut p = clean();
        apply(Action::ZoomIn, &mut p);
        assert!((p.zoom() - 3.0 / 1.05).abs() < 1e-6);
        assert!(p.is_dirty());
        apply(Action::ZoomOut, &mut p);
        assert!((p.zoom() - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_presets() {
        let mut p = clean();
        apply(Action::Preset(3), &mut p);
        assert_eq!(p.zoom(), 0.000005);
        assert_eq!(p.center(), Vec2::new(-1.942068, 0.000409));
        assert!(p.is_dirty());

        apply(Action::Preset(0), &mut p);
        assert_eq!(p.zoom(), 3.0);
        assert_eq!(p.center(), Vec2::new(-0.75, 0.0));
    }

    #[test]
    fn test_iteration_bound_stays_positive() {
        let mut p = clean();
        apply(Action::MoreIterations, &mut p);
        assert_eq!(p.max_iterations(), 60);
        for _ in 0..10 {
            apply(Action::FewerIterations, &mut p);
        }
        assert_eq!(p.max_iterations(), 1);
    }

    #[test]
    fn test_window_effects_leave_params_clean() {
        let mut p = clean();
        assert_eq!(apply(Action::ToggleFullscreen, &mut p), Effect::ToggleFullscreen);
        assert_eq!(apply(Action::RebuildKernel, &mut p), Effect::RebuildKernel);
        assert_eq!(apply(Action::Quit, &mut p), Effect::Quit);
        assert!(!p.is_dirty());
    }

    #[test]
    fn test_key_table() {
        assert_eq!(action_for(egui::Key::A), Some(Action::PanLeft));
        assert_eq!(action_for(egui::Key::Num5), Some(Action::Preset(5)));
        assert_eq!(action_for(egui::Key::Escape), Some(Action::Quit));
        assert_eq!(action_for(egui::Key::Q), None);
    }
}

use flipbook_core::{FlipEngine, FlipFrame, PageTransition, PageVisual};
use tracing::trace;

/// Number of ticks a page turn takes at the default speed.
pub const DEFAULT_FLIP_STEPS: u32 = 8;

/// Terminal page-turn engine. Owns the presented page layout and the state of
/// the in-flight turn; the session only ever talks to it through
/// [`FlipEngine`] requests.
pub struct PageTurnEngine {
    visuals: Vec<PageVisual>,
    current: usize,
    animation: Option<FlipAnimation>,
    steps: u32,
}

struct FlipAnimation {
    from: usize,
    to: usize,
    step: u32,
    total: u32,
}

impl FlipAnimation {
    fn progress(&self) -> f32 {
        ease_in_out_cubic(self.step as f32 / self.total as f32)
    }
}

pub fn ease_in_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

impl PageTurnEngine {
    pub fn new(steps: u32) -> Self {
        Self {
            visuals: Vec::new(),
            current: 0,
            animation: None,
            steps: steps.max(1),
        }
    }

    fn last_page(&self) -> usize {
        self.visuals.len().saturating_sub(1)
    }

    fn clamp_page(&self, page: usize) -> usize {
        page.min(self.last_page())
    }

    /// The page the book will rest on once any in-flight turn settles.
    fn resting_page(&self) -> usize {
        self.animation
            .as_ref()
            .map(|animation| animation.to)
            .unwrap_or(self.current)
    }
}

impl Default for PageTurnEngine {
    fn default() -> Self {
        Self::new(DEFAULT_FLIP_STEPS)
    }
}

impl FlipEngine for PageTurnEngine {
    fn present(&mut self, visuals: Vec<PageVisual>) {
        trace!(pages = visuals.len(), "layout presented");
        self.visuals = visuals;
        let last = self.last_page();
        self.current = self.current.min(last);
        if let Some(mut animation) = self.animation.take() {
            animation.to = animation.to.min(last);
            animation.from = animation.from.min(last);
            if animation.to == animation.from {
                self.current = animation.to;
            } else {
                self.animation = Some(animation);
            }
        }
    }

    fn flip(&mut self, page: usize) {
        if self.visuals.is_empty() {
            return;
        }
        let target = self.clamp_page(page);
        if target == self.resting_page() {
            return;
        }
        trace!(from = self.current, to = target, "flip requested");
        self.animation = Some(FlipAnimation {
            from: self.current,
            to: target,
            step: 0,
            total: self.steps,
        });
    }

    fn flip_next(&mut self) {
        self.flip(self.resting_page().saturating_add(1));
    }

    fn flip_prev(&mut self) {
        self.flip(self.resting_page().saturating_sub(1));
    }

    fn tick(&mut self) -> FlipFrame {
        if let Some(mut animation) = self.animation.take() {
            animation.step += 1;
            if animation.step >= animation.total {
                self.current = animation.to;
            } else {
                self.animation = Some(animation);
            }
        }
        self.frame()
    }

    fn frame(&self) -> FlipFrame {
        match &self.animation {
            Some(animation) => FlipFrame {
                current: animation.to,
                transition: Some(PageTransition {
                    from: animation.from,
                    to: animation.to,
                    progress: animation.progress(),
                }),
            },
            None => FlipFrame {
                current: self.current,
                transition: None,
            },
        }
    }

    fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    fn visual(&self, page: usize) -> Option<&PageVisual> {
        self.visuals.get(page)
    }

    fn page_count(&self) -> usize {
        self.visuals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flipbook_core::{compose_visuals, BookInfo, Chapter};

    fn visuals(chapter_count: usize) -> Vec<PageVisual> {
        let info = BookInfo {
            title: "Test Book".to_string(),
            author: None,
        };
        let chapters: Vec<Chapter> = (0..chapter_count)
            .map(|index| Chapter {
                title: format!("Chapter {}", index + 1),
                tagline: None,
                image: None,
                content: "text".to_string(),
            })
            .collect();
        compose_visuals(&info, &chapters)
    }

    fn engine(chapter_count: usize) -> PageTurnEngine {
        let mut engine = PageTurnEngine::new(4);
        engine.present(visuals(chapter_count));
        engine
    }

    #[test]
    fn flip_starts_an_animation_toward_the_target() {
        let mut engine = engine(3);

        engine.flip(4);

        assert!(engine.is_animating());
        let frame = engine.frame();
        assert_eq!(frame.current, 4);
        let transition = frame.transition.unwrap();
        assert_eq!(transition.from, 0);
        assert_eq!(transition.to, 4);
        assert_eq!(transition.progress, 0.0);
    }

    #[test]
    fn tick_settles_after_the_configured_steps() {
        let mut engine = engine(3);
        engine.flip(2);

        for _ in 0..3 {
            let frame = engine.tick();
            assert!(frame.transition.is_some());
        }
        let frame = engine.tick();
        assert!(frame.transition.is_none());
        assert_eq!(frame.current, 2);
        assert!(!engine.is_animating());
    }

    #[test]
    fn flip_to_resting_page_is_a_no_op() {
        let mut engine = engine(3);
        assert!(!engine.is_animating());

        engine.flip(0);
        assert!(!engine.is_animating());

        engine.flip(3);
        engine.flip(3);
        let frame = engine.frame();
        assert_eq!(frame.transition.unwrap().progress, 0.0);
    }

    #[test]
    fn flip_clamps_to_last_page() {
        let mut engine = engine(2);

        engine.flip(99);

        assert_eq!(engine.frame().current, 4);
    }

    #[test]
    fn flip_next_at_back_cover_stays_put() {
        let mut engine = engine(1);
        engine.flip(3);
        while engine.is_animating() {
            engine.tick();
        }

        engine.flip_next();

        assert!(!engine.is_animating());
        assert_eq!(engine.frame().current, 3);
    }

    #[test]
    fn retarget_mid_flight_restarts_from_current_rest() {
        let mut engine = engine(5);
        engine.flip(2);
        engine.tick();

        engine.flip_next();

        let transition = engine.frame().transition.unwrap();
        assert_eq!(transition.from, 0);
        assert_eq!(transition.to, 3);
        assert_eq!(transition.progress, 0.0);
    }

    #[test]
    fn present_clamps_current_when_layout_shrinks() {
        let mut engine = engine(5);
        engine.flip(7);
        while engine.is_animating() {
            engine.tick();
        }

        engine.present(visuals(1));

        assert_eq!(engine.frame().current, 3);
        assert_eq!(engine.page_count(), 4);
    }

    #[test]
    fn easing_covers_the_unit_interval() {
        assert_eq!(ease_in_out_cubic(0.0), 0.0);
        assert_eq!(ease_in_out_cubic(1.0), 1.0);
        assert!(ease_in_out_cubic(0.25) < 0.25);
        assert!(ease_in_out_cubic(0.75) > 0.75);
        let mut previous = 0.0;
        for step in 0..=10 {
            let value = ease_in_out_cubic(step as f32 / 10.0);
            assert!(value >= previous);
            previous = value;
        }
    }
}

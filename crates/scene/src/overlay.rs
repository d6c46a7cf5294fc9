use crate::picking::{CursorSample, DisplaySize, SampleKind};

/// Label offset from the pointer, in CSS pixels.
pub const LABEL_OFFSET_PX: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: [f64; 2],
    pub to: [f64; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

/// Everything the crosshair overlay draws for one pointer position.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayPlan {
    pub vertical: Segment,
    pub horizontal: Segment,
    pub label: Label,
}

impl OverlayPlan {
    /// Full-height and full-width lines through the pointer, with the depth
    /// label just below and to the right of it.
    pub fn for_sample(sample: &CursorSample, surface: DisplaySize, unit: Option<&str>) -> Self {
        let x = sample.pointer.x;
        let y = sample.pointer.y;
        Self {
            vertical: Segment {
                from: [x, 0.0],
                to: [x, surface.height],
            },
            horizontal: Segment {
                from: [0.0, y],
                to: [surface.width, y],
            },
            label: Label {
                x: x + LABEL_OFFSET_PX,
                y: y + LABEL_OFFSET_PX,
                text: depth_label(sample, unit),
            },
        }
    }
}

/// `"Depth: 128"` for channel intensities, `"Depth: 5.02 ft"` for physical
/// values.
pub fn depth_label(sample: &CursorSample, unit: Option<&str>) -> String {
    let value = match sample.kind {
        SampleKind::Channel => format!("{}", sample.raw.round() as i64),
        SampleKind::Physical => format!("{:.2}", sample.depth),
    };
    match unit.map(str::trim).filter(|u| !u.is_empty()) {
        Some(unit) if sample.kind == SampleKind::Physical => format!("Depth: {value} {unit}"),
        _ => format!("Depth: {value}"),
    }
}

/// Side-effecting half of the overlay. Implemented by the browser canvas and
/// by test recorders.
pub trait OverlayPainter {
    /// Put back the pixels of the unannotated depth image.
    fn restore_base(&mut self);
    fn segment(&mut self, segment: &Segment);
    fn label(&mut self, label: &Label);
    /// Hide any label drawn outside the surface (e.g. a DOM tooltip).
    fn hide_label(&mut self) {}
}

/// Repaints from scratch: restore, then draw `plan` if there is one.
///
/// Never erases old lines incrementally, so no artifacts survive a move.
pub fn paint_overlay(painter: &mut dyn OverlayPainter, plan: Option<&OverlayPlan>) {
    painter.restore_base();
    match plan {
        Some(plan) => {
            painter.segment(&plan.vertical);
            painter.segment(&plan.horizontal);
            painter.label(&plan.label);
        }
        None => painter.hide_label(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picking::Pointer;

    #[derive(Debug, Default)]
    struct Recorder {
        ops: Vec<String>,
    }

    impl OverlayPainter for Recorder {
        fn restore_base(&mut self) {
            self.ops.push("restore".to_string());
        }

        fn segment(&mut self, s: &Segment) {
            self.ops.push(format!(
                "line {},{} -> {},{}",
                s.from[0], s.from[1], s.to[0], s.to[1]
            ));
        }

        fn label(&mut self, l: &Label) {
            self.ops.push(format!("label {},{} {}", l.x, l.y, l.text));
        }

        fn hide_label(&mut self) {
            self.ops.push("hide".to_string());
        }
    }

    fn sample(kind: SampleKind, raw: f32, depth: f32) -> CursorSample {
        CursorSample {
            pointer: Pointer::new(30.0, 12.0),
            buffer_x: 3,
            buffer_y: 1,
            index: 13,
            raw,
            depth,
            kind,
        }
    }

    #[test]
    fn plan_spans_surface_through_pointer() {
        let plan = OverlayPlan::for_sample(
            &sample(SampleKind::Channel, 128.0, 128.0),
            DisplaySize::new(100.0, 50.0),
            None,
        );
        assert_eq!(plan.vertical.from, [30.0, 0.0]);
        assert_eq!(plan.vertical.to, [30.0, 50.0]);
        assert_eq!(plan.horizontal.from, [0.0, 12.0]);
        assert_eq!(plan.horizontal.to, [100.0, 12.0]);
        assert_eq!((plan.label.x, plan.label.y), (40.0, 22.0));
        assert_eq!(plan.label.text, "Depth: 128");
    }

    #[test]
    fn physical_labels_use_two_decimals_and_unit() {
        let s = sample(SampleKind::Physical, 128.0, 5.019_608);
        assert_eq!(depth_label(&s, Some("ft")), "Depth: 5.02 ft");
        assert_eq!(depth_label(&s, Some("  ")), "Depth: 5.02");
        // Channel intensities carry no unit.
        let c = sample(SampleKind::Channel, 7.0, 7.0);
        assert_eq!(depth_label(&c, Some("ft")), "Depth: 7");
    }

    #[test]
    fn every_paint_restores_first() {
        let mut rec = Recorder::default();
        let plan = OverlayPlan::for_sample(
            &sample(SampleKind::Channel, 1.0, 1.0),
            DisplaySize::new(10.0, 10.0),
            None,
        );

        paint_overlay(&mut rec, Some(&plan));
        paint_overlay(&mut rec, None);

        assert_eq!(
            rec.ops,
            vec![
                "restore",
                "line 30,0 -> 30,10",
                "line 0,12 -> 10,12",
                "label 40,22 Depth: 1",
                "restore",
                "hide",
            ]
        );
    }
}

//! Closest character offset to a horizontal pixel position.
//!
//! Used for vertical cursor movement: the caller knows the x coordinate the
//! caret should keep and whether it must land on the first or last visual
//! line of the target block. Exact per-character widths would need a shaping
//! engine, so this binary-searches offsets against caret rects reported by
//! the [`LayoutProbe`] instead.
//!
//! Comparisons near sub-pixel boundaries can oscillate, so the search is
//! capped at [`OverlayConfig::max_locate_iterations`] probes and returns the
//! best candidate seen.

use crate::config::OverlayConfig;
use crate::dom::{Document, NodeId};
use crate::error::Result;
use crate::platform::LayoutProbe;
use crate::text::{point_at_offset, text_len};
use crate::types::CaretRect;

/// Which visual line the located offset must sit on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LineConstraint {
    pub first_line: bool,
    pub last_line: bool,
}

impl LineConstraint {
    pub const ANY: Self = Self {
        first_line: false,
        last_line: false,
    };

    pub fn first_line() -> Self {
        Self {
            first_line: true,
            last_line: false,
        }
    }

    pub fn last_line() -> Self {
        Self {
            first_line: false,
            last_line: true,
        }
    }
}

/// Result of a locate request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Located {
    /// The host has no characters.
    NotFound,
    /// Best offset found and its horizontal distance from the target.
    Found { offset: usize, distance: f64 },
}

impl Located {
    pub fn offset(&self) -> Option<usize> {
        match self {
            Located::Found { offset, .. } => Some(*offset),
            Located::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Located::Found { .. })
    }
}

/// Caret rect for a stream offset, materialized as a boundary point.
pub fn caret_rect_at<P: LayoutProbe + ?Sized>(
    doc: &Document,
    host: NodeId,
    probe: &P,
    offset: usize,
) -> Option<CaretRect> {
    let point = point_at_offset(doc, host, offset).ok()?;
    probe.caret_rect(doc, point)
}

/// Find the offset in `host` whose caret is closest to `target_x`.
pub fn locate<P: LayoutProbe + ?Sized>(
    doc: &Document,
    host: NodeId,
    probe: &P,
    target_x: f64,
    constraint: LineConstraint,
    config: &OverlayConfig,
) -> Result<Located> {
    let total = text_len(doc, host)?;
    if total == 0 {
        return Ok(Located::NotFound);
    }

    let first_top = constraint
        .first_line
        .then(|| caret_rect_at(doc, host, probe, 0))
        .flatten()
        .map(|r| r.top());
    let last_bottom = constraint
        .last_line
        .then(|| caret_rect_at(doc, host, probe, total))
        .flatten()
        .map(|r| r.bottom());
    if constraint.first_line && first_top.is_none()
        || constraint.last_line && last_bottom.is_none()
    {
        tracing::warn!(
            target: "weaver::locate",
            %host,
            "host edge not rendered, ignoring line constraint"
        );
    }

    let tolerance = config.caret_tolerance;
    let mut lo = 0usize;
    let mut hi = total;
    let mut best: Option<(usize, f64)> = None;

    for iteration in 0..config.max_locate_iterations {
        if lo > hi {
            break;
        }
        let mid = lo + (hi - lo) / 2;
        let Some(rect) = caret_rect_at(doc, host, probe, mid) else {
            tracing::trace!(target: "weaver::locate", mid, "probe returned no rect");
            lo = mid + 1;
            continue;
        };

        if first_top.is_some_and(|top| (rect.top() - top).abs() > tolerance) {
            if mid == 0 {
                break;
            }
            hi = mid - 1;
            continue;
        }
        if last_bottom.is_some_and(|bottom| (rect.bottom() - bottom).abs() > tolerance) {
            lo = mid + 1;
            continue;
        }

        let distance = (rect.left() - target_x).abs();
        tracing::trace!(
            target: "weaver::locate",
            iteration,
            mid,
            left = rect.left(),
            distance,
            "probe"
        );
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((mid, distance));
        }

        if target_x < rect.left() {
            if mid == 0 {
                break;
            }
            hi = mid - 1;
        } else {
            lo = mid + 1;
        }
    }

    let (offset, distance) = best.unwrap_or_else(|| {
        // Nothing qualified for the required line; clamp to that line's edge.
        let offset = if constraint.last_line && !constraint.first_line {
            total
        } else {
            0
        };
        let distance = caret_rect_at(doc, host, probe, offset)
            .map(|r| (r.left() - target_x).abs())
            .unwrap_or(f64::INFINITY);
        (offset, distance)
    });

    tracing::debug!(target: "weaver::locate", %host, target_x, offset, distance, "located");
    Ok(Located::Found { offset, distance })
}

//! Rendering abstraction for geometric queries.
//!
//! The editing core never measures text itself. It asks a [`LayoutProbe`]
//! where a collapsed caret at a boundary point is drawn. The browser layer
//! answers with `Range::getBoundingClientRect`; [`MonospaceProbe`] answers
//! headlessly for tests and terminal hosts.

use crate::dom::{Document, NodeId};
use crate::text::{extract_text, offset_of_point};
use crate::types::{BoundaryPoint, CaretRect};

/// Platform-specific caret measurement.
pub trait LayoutProbe {
    /// Rendered box of a zero-width caret placed at `point`.
    ///
    /// Returns None if the point is not rendered (detached, hidden, zero-size host).
    fn caret_rect(&self, doc: &Document, point: BoundaryPoint) -> Option<CaretRect>;
}

impl<P: LayoutProbe + ?Sized> LayoutProbe for &P {
    fn caret_rect(&self, doc: &Document, point: BoundaryPoint) -> Option<CaretRect> {
        (**self).caret_rect(doc, point)
    }
}

/// Fixed-cell layout: every character is one cell wide, lines break at `\n`
/// and optionally soft-wrap at a column limit.
#[derive(Clone, Debug)]
pub struct MonospaceProbe {
    host: NodeId,
    cell_width: f64,
    line_height: f64,
    wrap_columns: Option<usize>,
}

impl MonospaceProbe {
    pub fn new(host: NodeId, cell_width: f64, line_height: f64) -> Self {
        Self {
            host,
            cell_width,
            line_height,
            wrap_columns: None,
        }
    }

    /// Soft-wrap after `columns` cells.
    pub fn with_wrap(mut self, columns: usize) -> Self {
        self.wrap_columns = Some(columns.max(1));
        self
    }

    /// Visual (row, column) of the caret before stream offset `offset`.
    fn row_col(&self, text: &str, offset: usize) -> (usize, usize) {
        let (mut units, mut row, mut col) = (0, 0, 0);
        for ch in text.chars() {
            if units >= offset {
                break;
            }
            units += ch.len_utf16();
            if ch == '\n' {
                row += 1;
                col = 0;
                continue;
            }
            col += 1;
            if self.wrap_columns.is_some_and(|w| col >= w) {
                row += 1;
                col = 0;
            }
        }
        (row, col)
    }
}

impl LayoutProbe for MonospaceProbe {
    fn caret_rect(&self, doc: &Document, point: BoundaryPoint) -> Option<CaretRect> {
        let offset = offset_of_point(doc, self.host, point).ok()?;
        let text = extract_text(doc, self.host).ok()?;
        let (row, col) = self.row_col(&text, offset);
        Some(CaretRect::new(
            col as f64 * self.cell_width,
            row as f64 * self.line_height,
            self.line_height,
        ))
    }
}

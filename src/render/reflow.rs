//! Anchor-preserving relayout of the displayed list.
//!
//! Elements are stacked edge to edge around a pivot: the first visible
//! (non-hidden) element keeps its `top`, everything above it is stacked
//! upward and everything from the first hidden element below it is stacked
//! downward. Hidden elements are those inserted or invalidated since the
//! last pass.

use tracing::trace;

use super::element::RenderElement;
use super::surface::VisualNode;

/// Bit set when only newly inserted elements need positioning.
pub const REFLOW_TRIGGER: u8 = 1;
/// Bit set when every element must be repositioned around the anchor.
pub const REFLOW_FULL: u8 = 2;

/// Position (in `displayed`) of the element the user is looking at: the
/// first visible element whose top is at or below the scroll offset.
///
/// Falls back to the last visible element above the offset when nothing
/// starts inside the viewport.
pub fn find_anchor<N: VisualNode>(
    displayed: &[RenderElement<N>],
    scroll_top: f64,
    client_height: f64,
) -> Option<usize> {
    let scroll_bottom = scroll_top + client_height;
    let mut previous = None;
    for (position, element) in displayed.iter().enumerate() {
        if element.node.is_hidden() {
            continue;
        }
        let top = element.top();
        if top >= scroll_top {
            if top > scroll_bottom {
                return previous.or(Some(position));
            }
            return Some(position);
        }
        previous = Some(position);
    }
    previous
}

/// Hides every displayed element except the one at `keep`.
pub fn hide_all_but<N: VisualNode>(displayed: &[RenderElement<N>], keep: usize) {
    for (position, element) in displayed.iter().enumerate() {
        if position != keep {
            element.node.set_opacity(0.0);
        }
    }
}

/// Restacks hidden elements around the first visible one and shows them.
pub fn restack<N: VisualNode>(displayed: &[RenderElement<N>]) {
    if displayed.is_empty() {
        return;
    }
    let pivot = match displayed.iter().position(|e| !e.node.is_hidden()) {
        Some(pivot) => pivot,
        None => {
            displayed[0].node.set_opacity(1.0);
            0
        }
    };

    for position in (0..pivot).rev() {
        let below = &displayed[position + 1].node;
        let element = &displayed[position];
        element
            .node
            .set_top(below.top() - element.node.measured_height());
        element.node.set_opacity(1.0);
        trace!(index = element.index(), top = element.top(), "Flowing album upward");
    }

    let first_hidden = displayed[pivot + 1..]
        .iter()
        .position(|e| e.node.is_hidden())
        .map(|offset| pivot + 1 + offset);
    if let Some(start) = first_hidden {
        for position in start..displayed.len() {
            let above = &displayed[position - 1].node;
            let element = &displayed[position];
            element.node.set_top(above.bottom());
            element.node.set_opacity(1.0);
            trace!(index = element.index(), top = element.top(), "Flowing album downward");
        }
    }
}

/// Moves the whole list down when the topmost element drifted above the
/// coordinate origin. Returns the shift applied (0 when none was needed);
/// the caller scrolls by the same amount so nothing moves on screen.
pub fn normalize_drift<N: VisualNode>(displayed: &[RenderElement<N>]) -> f64 {
    let Some(first) = displayed.first() else {
        return 0.0;
    };
    let top = first.top();
    if top >= 0.0 {
        return 0.0;
    }
    let shift = -top;
    for element in displayed {
        element.node.set_top(element.top() + shift);
    }
    shift
}

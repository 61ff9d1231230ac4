//! View models for the cart surfaces.
//!
//! Badge, drawer, popover and toast hold no state of their own; each is built
//! from the facade (or a notice) whenever it needs to render. Prices are
//! preformatted strings, the way templates want them.

use marketplace_core::{CurrencyCode, format_amount};

use crate::api::CartService;
use crate::cart::{CartContents, CartLine, UnifiedCart};
use crate::checkout::{CheckoutSummary, FREE_SHIPPING_THRESHOLD};
use crate::notify::CartToast;

/// Lines shown in the popover before collapsing into "+N more".
pub const POPOVER_LINE_LIMIT: usize = 3;

/// Highest count the badge spells out.
const BADGE_LIMIT: u64 = 99;

const PLACEHOLDER_IMAGE: &str = "/placeholder-product.jpg";

fn money(amount: rust_decimal::Decimal) -> String {
    format_amount(amount, CurrencyCode::default())
}

fn plural(count: impl Into<u64>, noun: &str) -> String {
    let count = count.into();
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Cart icon badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartBadge {
    pub count: u64,
    /// `None` hides the badge.
    pub label: Option<String>,
}

impl CartBadge {
    #[must_use]
    pub fn from_contents(contents: &CartContents) -> Self {
        let count = contents.total_items();
        let label = match count {
            0 => None,
            n if n > BADGE_LIMIT => Some(format!("{BADGE_LIMIT}+")),
            n => Some(n.to_string()),
        };
        Self { count, label }
    }
}

/// A cart line ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineView {
    pub product_id: String,
    pub name: String,
    pub vendor_name: Option<String>,
    pub image_url: String,
    pub quantity: u32,
    pub unit_price: String,
    pub line_price: String,
    /// The decrement control is disabled at 1; removal is explicit.
    pub can_decrement: bool,
}

impl From<&CartLine> for CartLineView {
    fn from(line: &CartLine) -> Self {
        let product = line.product.as_ref();
        Self {
            product_id: line.product_id.to_string(),
            name: product.map_or_else(|| line.product_id.to_string(), |p| p.name.clone()),
            vendor_name: product.and_then(|p| p.vendor_name.clone()),
            image_url: product
                .map(|p| p.image_url.clone())
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
            quantity: line.quantity,
            unit_price: money(line.unit_price()),
            line_price: money(line.line_total()),
            can_decrement: line.quantity > 1,
        }
    }
}

/// Formatted order totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalsView {
    pub subtotal: String,
    /// `"Free"` above the threshold.
    pub shipping: String,
    pub total: String,
    /// Shown while shipping is still charged.
    pub free_shipping_hint: Option<String>,
}

impl From<CheckoutSummary> for TotalsView {
    fn from(summary: CheckoutSummary) -> Self {
        let free = summary.is_free_shipping();
        Self {
            subtotal: money(summary.subtotal),
            shipping: if free {
                "Free".to_string()
            } else {
                money(summary.shipping)
            },
            total: money(summary.total),
            free_shipping_hint: (!free)
                .then(|| format!("Free shipping on orders over {}", money(FREE_SHIPPING_THRESHOLD))),
        }
    }
}

/// Side drawer listing the whole cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartDrawerView {
    /// "N item(s) in your cart", counting distinct lines.
    pub heading: String,
    pub lines: Vec<CartLineView>,
    pub totals: TotalsView,
    pub is_empty: bool,
}

impl CartDrawerView {
    #[must_use]
    pub fn from_contents(contents: &CartContents) -> Self {
        let count = u64::try_from(contents.item_count()).unwrap_or(u64::MAX);
        Self {
            heading: format!("{} in your cart", plural(count, "item")),
            lines: contents.lines().iter().map(CartLineView::from).collect(),
            totals: CheckoutSummary::for_contents(contents).into(),
            is_empty: contents.is_empty(),
        }
    }
}

/// Popover shown right after an add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartPopoverView {
    /// "N item(s) in your cart", counting quantities.
    pub heading: String,
    pub lines: Vec<CartLineView>,
    /// "+N more item(s)" when lines were cut.
    pub more: Option<String>,
    pub totals: TotalsView,
}

impl CartPopoverView {
    /// The popover for the current state, or `None` when it should be closed:
    /// it shows only while the feedback signal is up and the cart has lines.
    #[must_use]
    pub fn build(contents: &CartContents, feedback_visible: bool) -> Option<Self> {
        if !feedback_visible || contents.is_empty() {
            return None;
        }

        let hidden = contents.item_count().saturating_sub(POPOVER_LINE_LIMIT);
        Some(Self {
            heading: format!("{} in your cart", plural(contents.total_items(), "item")),
            lines: contents
                .lines()
                .iter()
                .take(POPOVER_LINE_LIMIT)
                .map(CartLineView::from)
                .collect(),
            more: (hidden > 0).then(|| {
                format!("+{}", plural(u64::try_from(hidden).unwrap_or(u64::MAX), "more item"))
            }),
            totals: CheckoutSummary::for_contents(contents).into(),
        })
    }

    /// Convenience over [`Self::build`] reading the facade.
    #[must_use]
    pub fn for_cart<S: CartService>(cart: &UnifiedCart<S>) -> Option<Self> {
        Self::build(&cart.contents(), cart.show_added_feedback())
    }
}

/// "Added to cart" toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartToastView {
    pub title: String,
    pub product_name: String,
    /// "by {vendor}".
    pub vendor_line: Option<String>,
    pub quantity_line: String,
    pub image_url: String,
    pub duration_ms: u64,
}

impl From<&CartToast> for CartToastView {
    fn from(toast: &CartToast) -> Self {
        Self {
            title: "Added to cart".to_string(),
            product_name: toast.product.name.clone(),
            vendor_line: toast
                .product
                .vendor_name
                .as_ref()
                .map(|vendor| format!("by {vendor}")),
            quantity_line: format!("Quantity: {}", toast.quantity),
            image_url: if toast.product.image_url.is_empty() {
                PLACEHOLDER_IMAGE.to_string()
            } else {
                toast.product.image_url.clone()
            },
            duration_ms: u64::try_from(toast.duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use marketplace_core::ProductId;

    use super::*;
    use crate::cart::test_support::snapshot;
    use crate::notify::CART_TOAST_DURATION;

    fn contents(lines: &[(&str, u32, i64)]) -> CartContents {
        CartContents::new(
            lines
                .iter()
                .map(|&(id, quantity, price)| CartLine {
                    product_id: ProductId::new(id),
                    quantity,
                    product: Some(snapshot(id, price)),
                })
                .collect(),
        )
    }

    #[test]
    fn test_badge() {
        assert_eq!(CartBadge::from_contents(&CartContents::default()).label, None);
        assert_eq!(
            CartBadge::from_contents(&contents(&[("p1", 3, 1)])).label.as_deref(),
            Some("3")
        );
        let many = CartBadge::from_contents(&contents(&[("p1", 60, 1), ("p2", 40, 1)]));
        assert_eq!(many.count, 100);
        assert_eq!(many.label.as_deref(), Some("99+"));
    }

    #[test]
    fn test_drawer() {
        let view = CartDrawerView::from_contents(&contents(&[("p1", 2, 100), ("p2", 1, 1250)]));
        assert_eq!(view.heading, "2 items in your cart");
        assert_eq!(view.lines[0].unit_price, "GH₵100.00");
        assert_eq!(view.lines[0].line_price, "GH₵200.00");
        assert_eq!(view.lines[0].vendor_name.as_deref(), Some("Adinkra Crafts"));
        assert!(view.lines[0].can_decrement);
        assert!(!view.lines[1].can_decrement);
        assert_eq!(view.totals.subtotal, "GH₵1,450.00");
        assert_eq!(view.totals.shipping, "Free");
        assert_eq!(view.totals.free_shipping_hint, None);
        assert!(!view.is_empty);

        let empty = CartDrawerView::from_contents(&CartContents::default());
        assert!(empty.is_empty);
        assert_eq!(empty.heading, "0 items in your cart");
        assert_eq!(empty.totals.shipping, "GH₵50.00");
        assert_eq!(
            empty.totals.free_shipping_hint.as_deref(),
            Some("Free shipping on orders over GH₵500.00")
        );
    }

    #[test]
    fn test_line_without_snapshot() {
        let line = CartLine {
            product_id: ProductId::new("p9"),
            quantity: 1,
            product: None,
        };
        let view = CartLineView::from(&line);
        assert_eq!(view.name, "p9");
        assert_eq!(view.unit_price, "GH₵0.00");
        assert_eq!(view.image_url, "/placeholder-product.jpg");
    }

    #[test]
    fn test_popover() {
        let cart = contents(&[("p1", 1, 10), ("p2", 1, 10), ("p3", 1, 10), ("p4", 2, 10)]);

        assert!(CartPopoverView::build(&cart, false).is_none());
        assert!(CartPopoverView::build(&CartContents::default(), true).is_none());

        let view = CartPopoverView::build(&cart, true).unwrap();
        assert_eq!(view.heading, "5 items in your cart");
        assert_eq!(view.lines.len(), 3);
        assert_eq!(view.more.as_deref(), Some("+1 more item"));
        assert_eq!(view.totals.total, "GH₵100.00");

        let single = CartPopoverView::build(&contents(&[("p1", 1, 10)]), true).unwrap();
        assert_eq!(single.heading, "1 item in your cart");
        assert_eq!(single.more, None);
    }

    #[test]
    fn test_toast() {
        let toast = CartToast {
            product: snapshot("p1", 100),
            quantity: 2,
            duration: CART_TOAST_DURATION,
        };
        let view = CartToastView::from(&toast);
        assert_eq!(view.product_name, "Product p1");
        assert_eq!(view.vendor_line.as_deref(), Some("by Adinkra Crafts"));
        assert_eq!(view.quantity_line, "Quantity: 2");
        assert_eq!(view.duration_ms, 3000);
    }
}

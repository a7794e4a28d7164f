//! Outcome of a single dispatched page
//!
//! Every page handed to a worker ends in exactly one of these states. The
//! domain counters reported by status queries are derived from them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    /// Fetched and classified as a product page
    Product,

    /// Fetched and classified as something else (listing, info, ...)
    NotProduct,

    /// Redirected to a URL already visited under its final key
    Duplicate,

    /// Fetch failed (terminal status, retries exhausted, render failure)
    Failed,

    /// Response was not HTML
    ContentMismatch,

    /// Redirect left the domain's scope
    RedirectOutOfScope,
}

impl PageState {
    /// Returns true if the page counts as a failed page
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::ContentMismatch | Self::RedirectOutOfScope
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::NotProduct => "not_product",
            Self::Duplicate => "duplicate",
            Self::Failed => "failed",
            Self::ContentMismatch => "content_mismatch",
            Self::RedirectOutOfScope => "redirect_out_of_scope",
        }
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

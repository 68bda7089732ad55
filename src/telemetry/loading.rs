//! Span helpers for busy operations.

use tracing::Span;

use crate::model::{Scope, Token};

/// Span covering one wrapped busy operation.
///
/// `loading.revealed` is declared empty and filled by [`record_outcome`].
pub fn operation_span(scope: Scope, token: Token) -> Span {
    tracing::info_span!(
        "loading.operation",
        "loading.scope" = scope.as_str(),
        "loading.token" = %token,
        "loading.revealed" = tracing::field::Empty,
    )
}

/// Record whether the indicator was visible when the operation finished.
pub fn record_outcome(span: &Span, revealed: bool) {
    span.record("loading.revealed", revealed);
}

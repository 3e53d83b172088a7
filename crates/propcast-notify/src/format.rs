//! HTML rendering of a proposal card for the chat channel.

use propcast_core::{ProposalCard, Side};

/// Escape the characters HTML parse mode treats specially.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn side_marker(side: Side) -> &'static str {
    match side {
        Side::Long => "🟢",
        Side::Short => "🔴",
    }
}

/// Render the card as the chat message body.
pub fn card_html(card: &ProposalCard) -> String {
    let mut lines = Vec::with_capacity(10);
    lines.push(format!(
        "{} <b>{} {}</b> · <i>{}</i>",
        side_marker(card.side),
        escape(&card.symbol),
        card.side,
        escape(&card.strategy)
    ));
    lines.push(format!("entry: <code>{:.4}</code>", card.entry));
    lines.push(format!("stop: <code>{:.4}</code>", card.stop));
    lines.push(format!(
        "size: <code>{:.2} USDT</code> @ {}x (risk {:.2} USDT)",
        card.position_usdt, card.leverage_suggest, card.max_risk_usdt
    ));
    lines.push(format!(
        "ttl: {}m · confidence: {:.0}%",
        card.ttl_minutes,
        card.confidence.clamp(0.0, 100.0)
    ));
    if !card.rationale.is_empty() {
        lines.push(format!("<i>{}</i>", escape(&card.rationale)));
    }
    lines.join("\n")
}

//! Shared UI icons.
//!
//! Each icon carries a plain-text fallback for terminals without emoji support.

use console::Emoji;

// Stage status
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SKIPPED: Emoji<'_, '_> = Emoji("⏭️  ", "[SKIP]");
pub static PENDING: Emoji<'_, '_> = Emoji("⏸️  ", "[ ]");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");

// Change listings
pub static FILE_NEW: Emoji<'_, '_> = Emoji("📄 ", "+");
pub static FILE_MOD: Emoji<'_, '_> = Emoji("📝 ", "~");
pub static FILE_DEL: Emoji<'_, '_> = Emoji("🗑️  ", "-");
pub static FILE_MOVED: Emoji<'_, '_> = Emoji("🔀 ", ">");
pub static COMMIT: Emoji<'_, '_> = Emoji("🔖 ", "*");

pub static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[WARN]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");

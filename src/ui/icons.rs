pub struct Icons;

impl Icons {
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const STATS: &str = "📊";
    pub const SEARCH: &str = "🔍";
    pub const DATABASE: &str = "🗄️";
    pub const LEDGER: &str = "📒";
    pub const MONEY: &str = "💰";
    pub const CALENDAR: &str = "📅";
    pub const TRASH: &str = "🗑️";
    pub const RESTORE: &str = "♻️";
    pub const PACKAGE: &str = "📦";
    pub const UP: &str = "⬆️";
    pub const DOWN: &str = "⬇️";
    pub const GOAL: &str = "🎯";
}

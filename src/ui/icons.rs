pub struct Icons;

impl Icons {
    pub const ROCKET: &str = "🚀";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const LINK: &str = "🔗";
    pub const PACKAGE: &str = "📦";
    pub const DISK: &str = "💾";
    pub const CLOCK: &str = "⏱️";
    pub const UP: &str = "⬆️";
    pub const DOWN: &str = "⬇️";
    pub const RIGHT: &str = "➡️";
    pub const LEFT: &str = "⬅️";
    pub const BOLT: &str = "⚡";
}

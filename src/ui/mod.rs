pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{dim, error, header, layer_badge, muted, section, status, success, timing, warn};
pub use table::{layers_table, stats_table, LayerRow, TableBuilder};
pub use theme::{theme, Theme};

pub mod autosave;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod gateway;
pub mod interaction;
pub mod logging;
pub mod model;
pub mod render;
pub mod route_dump;
pub mod routing;
pub mod scene;
pub mod session;
pub mod text_metrics;
pub mod theme;
pub mod viewport;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, load_config, parse_config};
pub use gateway::{DirGateway, GatewayError, MemoryGateway, TreeGateway};
pub use interaction::{AppState, Effect, Mode, Panel, Selection, UiEvent};
pub use model::{DiagramData, Edge, LineStyle, Person, Tree, TreeSummary};
pub use render::render_svg;
pub use scene::Scene;
pub use session::Session;
pub use theme::Theme;
pub use viewport::Viewport;

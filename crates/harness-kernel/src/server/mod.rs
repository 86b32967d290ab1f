mod router;
mod state;

pub use router::{
    build_api_router, build_console_router, console_shell_router, media_router, render_console,
    MEDIA_PREFIX,
};
pub use state::{Appearance, ServeHealth, ServeState};

pub mod app;
pub mod renderer;

use color_eyre::Result;
use app::App;
use renderer::config::Config;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let app = App::new(Config::default())?;
    app.run()?;

    Ok(())
}

use crate::accounts::kind_dir;
use crate::categories::CategoryRegistry;
use crate::cli::Context;
use crate::error::Result;
use crate::models::AccountKind;
use crate::settings::{load_settings, save_settings};

pub fn run(ctx: &Context) -> Result<()> {
    let mut settings = load_settings();
    settings.data_dir = ctx.data_dir.to_string_lossy().to_string();
    save_settings(&settings)?;

    for kind in AccountKind::ALL {
        std::fs::create_dir_all(kind_dir(&ctx.data_dir, kind))?;
    }
    if !ctx.categories_file.exists() {
        CategoryRegistry::new().save(&ctx.categories_file)?;
    }

    println!("Initialized midas at {}", ctx.data_dir.display());
    Ok(())
}

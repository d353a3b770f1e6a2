//! Configuration sections, one per `hotpage.toml` table.
//!
//! | Module      | TOML Section  | Purpose                               |
//! |-------------|---------------|---------------------------------------|
//! | `pages`     | `[pages]`     | Page source root and extensions       |
//! | `on_demand` | `[on_demand]` | Disposal and keep-alive tuning        |
//! | `compiler`  | `[compiler]`  | Output directory and compiler command |
//! | `serve`     | `[serve]`     | Development server                    |

mod compiler;
mod on_demand;
mod pages;
mod serve;

pub use compiler::CompilerConfig;
pub use on_demand::OnDemandConfig;
pub use pages::PagesConfig;
pub use serve::ServeConfig;

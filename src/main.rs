use datamover_store::output as out;
use datamover_store::{cli, StoreError};

mod app;
mod logging;

fn main() {
    let args = cli::parse();
    if let Err(e) = app::run(args) {
        out::print_error(&format!("{e:#}"));
        let code = e.downcast_ref::<StoreError>().map(StoreError::code).unwrap_or(1);
        std::process::exit(code);
    }
}

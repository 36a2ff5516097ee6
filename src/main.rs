mod actions;
mod classifier;
mod cli;
mod config;
mod cursor;
mod gestures;
mod hand;
mod input;
mod ipc;
mod limiter;
mod logging;
mod session;
mod slot;
mod swipe;
mod zoom;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}

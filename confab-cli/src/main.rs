//! This is the confab command line utility.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use confab_core::{
    chat::{self, Message},
    generation::{GenerationOptions, GenerationStatus, Generator},
    session::gemma::GemmaSession,
    tokenizer::{Tokenizer, Vocabulary},
    Args,
};

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    // parse command line
    let args = Args::parse();

    // setup logging
    if std::env::var_os("RUST_LOG").is_none() {
        // set `RUST_LOG=debug` to see debug logs
        std::env::set_var("RUST_LOG", "info");
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_module_path(false)
        .format_target(false)
        .init();

    // load the vocabulary artifact and the model checkpoint
    let data_path = Path::new(&args.model);
    let vocab = Vocabulary::from_path(&data_path.join("tokenizer.json"))?;
    let tokenizer = Tokenizer::new(vocab);
    let mut session = GemmaSession::load(&args)?;

    let options = GenerationOptions {
        max_new_tokens: args.max_new_tokens,
        step_timeout: args.step_timeout.map(Duration::from_secs),
        ..GenerationOptions::default()
    };

    let prompt = chat::render(&[Message::user(args.question.clone())]);

    log::info!("starting the generation loop\n\n");

    let start_gen = std::time::Instant::now();
    let mut generator = Generator::new(&mut session, &tokenizer, options);
    let generation = generator
        .generate(&prompt, |data| {
            if data.is_empty() {
                println!();
            } else {
                print!("{data}");
            }
            std::io::stdout().flush().unwrap();
        })
        .await;

    let dt = start_gen.elapsed();

    match generation.status {
        GenerationStatus::End => log::info!("end of turn"),
        GenerationStatus::MaxSteps => log::info!("token cap reached"),
        GenerationStatus::Cancelled => log::info!("generation cancelled"),
        GenerationStatus::Failed(reason) => anyhow::bail!("generation failed: {reason}"),
    }

    log::info!(
        "{} tokens generated ({:.2} token/s)",
        generation.steps,
        generation.steps as f64 / dt.as_secs_f64()
    );

    Ok(())
}

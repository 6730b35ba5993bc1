use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use story_narrator::core::audio::WavFileOutput;
use story_narrator::core::text::segment_with_boundaries;
use story_narrator::core::tts::PitchBand;
use story_narrator::{
    GeminiDialogue, GeminiSpeech, NarrationSynthesizer, NarrationVoice, NarratorConfig,
    NarratorVoice, PlaybackController, PlaybackState, Profile, StoryContext, StoryLanguage,
    StoryTeller, StoryTheme, TurnOutcome,
};

/// Story Narrator - interactive bedtime stories with spoken narration
#[derive(Parser, Debug)]
#[command(name = "story-narrator")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tell an interactive story, choosing how it continues after each part
    Tell {
        /// Child's name
        #[arg(long)]
        name: String,

        /// Age in years (3-10)
        #[arg(long, default_value_t = 6)]
        age: u8,

        /// Favourite things, e.g. "dragons and trains"
        #[arg(long)]
        interests: String,

        #[arg(long, default_value = "English")]
        language: String,

        /// Adventure, Friendship, Nature, Magic, Dreams or Animals
        #[arg(long, default_value = "Magic")]
        theme: String,

        /// Kore, Puck, Charon, Fenrir or Zephyr (defaults per language)
        #[arg(long)]
        voice: Option<String>,

        /// Voice pitch preference (0.5-1.5)
        #[arg(long, default_value_t = 1.0)]
        pitch: f32,

        /// Narrate each part of the story after it is written
        #[arg(long)]
        narrate: bool,
    },

    /// Narrate a text file
    Narrate {
        file: PathBuf,

        #[arg(long, default_value = "Kore")]
        voice: String,

        #[arg(long, default_value = "English")]
        language: String,

        #[arg(long, default_value_t = 1.0)]
        pitch: f32,

        /// Playback speed multiplier
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
    },

    /// Print the chunks a text file would be narrated in
    Segment {
        file: PathBuf,

        /// Longest chunk in characters
        #[arg(long)]
        max_chars: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = if let Some(config_path) = cli.config.as_ref() {
        info!("Loading configuration from {}", config_path.display());
        NarratorConfig::from_file(config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        NarratorConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };

    match cli.command {
        Commands::Segment { file, max_chars } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let max_chars = max_chars.unwrap_or(config.max_chunk_chars);
            for (chunk, boundary) in segment_with_boundaries(&text, max_chars) {
                let cut = boundary.map_or("end".to_string(), |b| format!("{b:?}").to_lowercase());
                println!(
                    "--- chunk {} ({} chars, cut: {}) ---",
                    chunk.index + 1,
                    chunk.char_len(),
                    cut
                );
                println!("{}", chunk.text);
            }
            Ok(())
        }
        Commands::Narrate {
            file,
            voice,
            language,
            pitch,
            speed,
        } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let story = StoryContext::new();
            let epoch = story.begin_story();
            story.append(epoch, &text);
            story.finish_turn(epoch);

            let controller = build_controller(&config, "narration")?;
            controller.set_rate(speed);
            let voice = NarrationVoice {
                voice: NarratorVoice::from_str_or_default(&voice),
                language: StoryLanguage::from_str_or_default(&language),
                pitch,
            };
            narrate(&controller, &story, voice).await
        }
        Commands::Tell {
            name,
            age,
            interests,
            language,
            theme,
            voice,
            pitch,
            narrate: speak,
        } => {
            let language = StoryLanguage::from_str_or_default(&language);
            let voice = match voice {
                Some(v) => NarratorVoice::from_str_or_default(&v),
                None => NarratorVoice::for_language(language.as_str()),
            };
            let profile = Profile {
                name,
                age,
                interests,
                language,
                voice,
                theme: StoryTheme::from_str_or_default(&theme),
                pitch,
            };
            tell(&config, profile, speak).await
        }
    }
}

fn build_controller(config: &NarratorConfig, prefix: &str) -> anyhow::Result<PlaybackController> {
    let speech = GeminiSpeech::new(config.speech_config().map_err(|e| anyhow!(e))?)?;
    let synthesizer = NarrationSynthesizer::new(Arc::new(speech), config.synthesizer_settings());
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create {}", config.output_dir.display()))?;
    let output = WavFileOutput::new(config.output_dir.clone(), prefix);

    Ok(PlaybackController::new(
        synthesizer,
        Arc::new(config.espeak_engine()),
        Arc::new(output),
    )
    .with_fallback_base_rate(config.fallback_base_rate))
}

/// Play the story and wait until playback returns to idle.
async fn narrate(
    controller: &PlaybackController,
    story: &StoryContext,
    voice: NarrationVoice,
) -> anyhow::Result<()> {
    println!("Narrating in a {} voice...", PitchBand::label(voice.pitch));
    let mut states = controller.subscribe();
    let state = controller.play(story, voice).await?;

    if state != PlaybackState::Idle {
        if let Some(kind) = controller.engine_kind() {
            info!(engine = kind.as_str(), "Narration playing");
        }
        tokio::select! {
            _ = states.wait_for(|s| *s == PlaybackState::Idle) => {}
            _ = tokio::signal::ctrl_c() => {
                controller.stop();
            }
        }
    }

    match controller.notice() {
        Some(notice) => println!("{notice}"),
        None => println!("Narration finished."),
    }
    Ok(())
}

/// Drive `turn` while echoing story text to stdout as it arrives.
async fn print_while<T>(
    story: &StoryContext,
    shown: &mut String,
    turn: impl Future<Output = T>,
) -> T {
    let mut changes = story.subscribe_changes();
    tokio::pin!(turn);
    loop {
        tokio::select! {
            result = &mut turn => {
                print_new(story, shown);
                return result;
            }
            Ok(()) = changes.changed() => print_new(story, shown),
        }
    }
}

fn print_new(story: &StoryContext, shown: &mut String) {
    let content = story.content();
    if let Some(rest) = content.strip_prefix(shown.as_str()) {
        print!("{rest}");
    } else if !shown.starts_with(&content) {
        // Replaced rather than extended, e.g. by the failure message.
        print!("\n{content}");
    }
    let _ = std::io::stdout().flush();
    *shown = content;
}

async fn tell(config: &NarratorConfig, profile: Profile, speak: bool) -> anyhow::Result<()> {
    let dialogue = GeminiDialogue::new(config.dialogue_config().map_err(|e| anyhow!(e))?)?;
    let story = Arc::new(StoryContext::new());
    let teller = StoryTeller::new(Arc::new(dialogue), story.clone());
    let controller = if speak {
        Some(build_controller(config, "story")?)
    } else {
        None
    };
    let voice = NarrationVoice::from(&profile);

    let mut shown = String::new();
    let mut outcome = print_while(&story, &mut shown, teller.start(profile)).await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        println!();

        if let Some(notice) = story.snapshot().notice {
            println!("{notice}");
        }

        let choices = match outcome {
            Ok(TurnOutcome::Finished { choices }) => choices,
            Ok(TurnOutcome::Superseded) => Vec::new(),
            Err(e) => {
                info!("Story turn failed: {}", e);
                story.choices()
            }
        };

        if let Some(controller) = controller.as_ref() {
            controller.stop();
            narrate(controller, &story, voice).await?;
        }

        if choices.is_empty() {
            println!("The end. Sweet dreams.");
            return Ok(());
        }

        println!();
        for (i, choice) in choices.iter().enumerate() {
            println!("  {}. {}", i + 1, choice);
        }
        println!("Choose a number (or q to finish):");

        let choice = loop {
            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };
            let line = line.trim();
            if line.eq_ignore_ascii_case("q") {
                teller.reset();
                return Ok(());
            }
            match line.parse::<usize>() {
                Ok(n) if (1..=choices.len()).contains(&n) => break choices[n - 1].clone(),
                _ => println!("Please pick 1-{}:", choices.len()),
            }
        };

        println!();
        outcome = print_while(&story, &mut shown, teller.choose(&choice)).await;
    }
}

use std::{path::PathBuf, sync::mpsc, thread};

use clap::{Parser, Subcommand};
use log::info;

use ghostrun::collector::replay_session;
use ghostrun::geo::GeoPoint;
use ghostrun::session::{RunningSession, SessionConfig, SessionUpdate};
use ghostrun::telemetry::{JsonlSampleProducer, Telemetry};
use ghostrun::{GhostrunError, writer};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded raw-sample file through the session engine
    Replay {
        /// Raw device samples, one JSON object per line
        #[arg(short, long)]
        input: PathBuf,

        /// Course polyline to score against, one {lat, lng} per line
        #[arg(short, long)]
        course: Option<PathBuf>,

        /// Recorded ghost run telemetry, one JSON object per line
        #[arg(short, long)]
        ghost: Option<PathBuf>,

        /// Write all session updates to this jsonl file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Save the finalized run record to this JSON file
        #[arg(short, long)]
        record: Option<PathBuf>,

        /// Body weight for the calorie estimate, kg
        #[arg(short, long)]
        weight_kg: Option<f64>,

        /// Name of the finalized run
        #[arg(short, long, default_value = "replayed run")]
        name: String,
    },
}

fn replay(
    input: PathBuf,
    course: Option<PathBuf>,
    ghost: Option<PathBuf>,
    output: Option<PathBuf>,
    record_file: Option<PathBuf>,
    weight_kg: Option<f64>,
    name: String,
) -> Result<(), GhostrunError> {
    let mut config = SessionConfig::from_local_file().unwrap_or_default();
    if let Some(weight_kg) = weight_kg {
        config.body_weight_kg = weight_kg;
    }

    let mut session = RunningSession::new(config);
    if let Some(course_file) = course {
        let polyline = load_jsonl::<GeoPoint>(&course_file)?;
        info!("Attached course with {} points", polyline.len());
        session.attach_course(polyline);
    }
    if let Some(ghost_file) = ghost {
        let recorded = load_jsonl::<Telemetry>(&ghost_file)?;
        info!("Attached ghost run with {} points", recorded.len());
        session.attach_ghost(&recorded);
    }

    let (update_tx, update_rx) = mpsc::channel::<SessionUpdate>();
    let printer = thread::spawn(move || {
        for update in &update_rx {
            if let SessionUpdate::StatusChange(status) = update {
                info!("Status: {status:?}");
            }
        }
    });

    let producer = JsonlSampleProducer::new(input);
    let session = if let Some(output_file) = output {
        let (writer_tx, writer_rx) = mpsc::channel::<SessionUpdate>();
        let session_writer = thread::spawn(move || writer::write_session(&output_file, writer_rx));
        let session = replay_session(producer, session, update_tx, Some(writer_tx))?;
        session_writer
            .join()
            .unwrap_or(Err(GhostrunError::SampleProducerError {
                description: "session writer thread panicked".to_string(),
            }))?;
        session
    } else {
        replay_session(producer, session, update_tx, None)?
    };
    let _ = printer.join();

    let finished_at = session.telemetries().last().map(|t| t.timestamp_ms).unwrap_or(0);
    let run_record = session.finalize(name, false, finished_at);
    if let Some(record_file) = record_file {
        run_record.save(&record_file)?;
        info!("Saved run record to {record_file:?}");
    }

    let summary = serde_json::to_string_pretty(&run_record.record)
        .map_err(|e| GhostrunError::RecordSerializeError { source: e })?;
    println!("{summary}");
    Ok(())
}

fn main() {
    colog::init();

    let cli = Args::parse();
    ctrlc::set_handler(move || {
        println!("Exiting...");
        std::process::exit(0);
    })
    .expect("Could not set Ctrl-C handler");
    match cli.command {
        Commands::Replay {
            input,
            course,
            ghost,
            output,
            record,
            weight_kg,
            name,
        } => replay(input, course, ghost, output, record, weight_kg, name)
            .expect("Error while replaying session"),
    };
}

fn load_jsonl<T: serde::de::DeserializeOwned>(file: &PathBuf) -> Result<Vec<T>, GhostrunError> {
    if !file.exists() {
        return Err(GhostrunError::InvalidSampleFile {
            path: format!("{file:?}"),
        });
    }
    serde_jsonlines::json_lines(file)
        .map_err(|e| GhostrunError::SampleLoaderError { source: e })?
        .collect::<Result<Vec<T>, std::io::Error>>()
        .map_err(|e| GhostrunError::SampleLoaderError { source: e })
}

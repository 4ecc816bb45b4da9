use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[zbus::proxy(
    interface = "org.campus.Rollcall1",
    default_service = "org.campus.Rollcall1",
    default_path = "/org/campus/Rollcall1"
)]
trait Rollcall {
    async fn start(&self, schedule_id: i64, tardy: &str) -> zbus::Result<String>;
    async fn pause(&self) -> zbus::Result<()>;
    async fn resume(&self) -> zbus::Result<()>;
    async fn stop(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
    async fn records(&self, query: &str) -> zbus::Result<String>;
    async fn edit_record(&self, id: &str, patch: &str) -> zbus::Result<bool>;
    async fn delete_record(&self, id: &str) -> zbus::Result<bool>;
    async fn seed_roster(&self, roster: &str) -> zbus::Result<u32>;
    async fn export_csv(&self, view: &str) -> zbus::Result<String>;
    async fn snapshot(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance monitoring CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a detection session
    Start {
        /// Schedule id; omitted = auto-resolve the class in session now
        #[arg(short, long)]
        schedule: Option<i64>,
        /// Tardy rule: minutes after start, "none", or a clock time
        #[arg(short, long)]
        tardy: Option<String>,
    },
    /// Pause the running session (ticks fire, no fetches)
    Pause,
    /// Resume a paused session
    Resume,
    /// Stop the session, stamp time-outs, persist the ledger
    Stop,
    /// Show session status
    Status,
    /// List ledger records, optionally filtered
    Records {
        /// Free-text filter across name/id/subject
        #[arg(short, long, default_value = "")]
        query: String,
    },
    /// Edit a record with a JSON patch
    Edit {
        /// Record id
        id: String,
        /// JSON patch, e.g. '{"uniform": "Missing ID card"}'
        patch: String,
    },
    /// Delete a record by id
    Delete { id: String },
    /// Seed the roster from a JSON file of {"name", "student_id"} entries
    Seed { file: PathBuf },
    /// Export the ledger as CSV
    Export {
        /// "uniform" or "timelog"
        #[arg(default_value = "timelog")]
        view: String,
        /// Output path; defaults to the generated filename
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Save the latest overlay snapshot as JPEG
    Snapshot {
        #[arg(default_value = "snapshot.jpg")]
        output: PathBuf,
    },
    /// List schedules straight from the service
    Schedules {
        /// Service base URL
        #[arg(long)]
        url: Option<String>,
    },
    /// Query persisted attendance history
    History {
        /// Filter by date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
        /// Filter by subject code
        #[arg(long)]
        subject: Option<String>,
        /// Filter by student id
        #[arg(long)]
        student: Option<String>,
        /// Database path
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Run camera diagnostics (bypasses the daemon)
    Test {
        /// Device path; omitted = probe /dev/video*
        #[arg(long)]
        device: Option<String>,
    },
}

fn service_url(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var("ROLLCALL_SERVICE_URL").ok())
        .unwrap_or_else(|| "http://127.0.0.1:5000".to_string())
}

async fn proxy() -> Result<RollcallProxy<'static>> {
    let conn = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    RollcallProxy::new(&conn)
        .await
        .context("rollcalld is not reachable on the bus")
}

fn print_json(raw: &str) {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default()),
        Err(_) => println!("{raw}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { schedule, tardy } => {
            let status = proxy()
                .await?
                .start(schedule.unwrap_or(0), tardy.as_deref().unwrap_or(""))
                .await?;
            println!("Session started");
            print_json(&status);
        }
        Commands::Pause => {
            proxy().await?.pause().await?;
            println!("Session paused");
        }
        Commands::Resume => {
            proxy().await?.resume().await?;
            println!("Session resumed");
        }
        Commands::Stop => {
            let status = proxy().await?.stop().await?;
            println!("Session stopped");
            print_json(&status);
        }
        Commands::Status => {
            print_json(&proxy().await?.status().await?);
        }
        Commands::Records { query } => {
            print_json(&proxy().await?.records(&query).await?);
        }
        Commands::Edit { id, patch } => {
            proxy().await?.edit_record(&id, &patch).await?;
            println!("Record {id} updated");
        }
        Commands::Delete { id } => {
            proxy().await?.delete_record(&id).await?;
            println!("Record {id} deleted");
        }
        Commands::Seed { file } => {
            let roster = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let seeded = proxy().await?.seed_roster(&roster).await?;
            println!("Seeded {seeded} roster entries");
        }
        Commands::Export { view, output } => {
            let raw = proxy().await?.export_csv(&view).await?;
            let value: serde_json::Value =
                serde_json::from_str(&raw).context("bad export reply")?;
            let filename = value["filename"].as_str().unwrap_or("attendance.csv");
            let content = value["content"].as_str().unwrap_or_default();
            let path = output.unwrap_or_else(|| PathBuf::from(filename));
            std::fs::write(&path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Exported {} records view to {}", view, path.display());
        }
        Commands::Snapshot { output } => {
            let encoded = proxy().await?.snapshot().await?;
            if encoded.is_empty() {
                println!("No snapshot available yet");
                return Ok(());
            }
            let jpeg = BASE64_STANDARD
                .decode(encoded.as_bytes())
                .context("bad snapshot payload")?;
            std::fs::write(&output, jpeg)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Snapshot written to {}", output.display());
        }
        Commands::Schedules { url } => {
            let client = rollcall_client::DetectionClient::new(
                service_url(url),
                Duration::from_secs(10),
            )?;
            let schedules = client.fetch_schedules().await?;
            if schedules.is_empty() {
                println!("No schedules");
            }
            for s in schedules {
                println!(
                    "{:>4}  {:<9} {}  {}-{}  room {}  {}",
                    s.id,
                    rollcall_core::schedule::day_name(s.day_of_week),
                    s.label(),
                    s.start_time.format("%H:%M"),
                    s.end_time.format("%H:%M"),
                    s.room.as_deref().unwrap_or("-"),
                    s.instructor.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::History {
            date,
            subject,
            student,
            db,
        } => {
            let date = date
                .map(|d| d.parse().context("date must be YYYY-MM-DD"))
                .transpose()?;
            let path = db.unwrap_or_else(rollcall_store::default_db_path);
            let store = rollcall_store::Store::open(&path).await?;
            let rows = store
                .history(rollcall_store::HistoryFilter {
                    date,
                    subject_code: subject,
                    student_id: student,
                })
                .await?;
            if rows.is_empty() {
                println!("No attendance history matched");
            }
            for r in rows {
                println!(
                    "{}  {:<10} {:<24} {:<8} in {}  out {}  {}",
                    r.date,
                    r.student_id,
                    r.student_name,
                    r.subject_code,
                    r.time_in.map(|t| t.to_string()).unwrap_or_else(|| "-".into()),
                    r.time_out.map(|t| t.to_string()).unwrap_or_else(|| "-".into()),
                    r.status,
                );
            }
        }
        Commands::Test { device } => {
            run_camera_test(device.as_deref())?;
        }
    }

    Ok(())
}

/// Direct camera diagnostics: probe devices, open one, grab a frame.
fn run_camera_test(device: Option<&str>) -> Result<()> {
    println!("Probing V4L2 devices...");
    let devices = rollcall_hw::Camera::list_devices();
    if devices.is_empty() {
        println!("No video capture devices found");
    }
    for d in &devices {
        println!("  {}  {} ({})", d.path, d.name, d.driver);
    }

    let path = match device {
        Some(path) => path.to_string(),
        None => match devices.first() {
            Some(d) => d.path.clone(),
            None => return Ok(()),
        },
    };

    println!("Opening {path}...");
    let camera = rollcall_hw::Camera::open(&path)?;
    println!(
        "Negotiated {}x{} {:?}",
        camera.width, camera.height, camera.fourcc
    );

    let frame = camera.capture_lit_frame(3)?;
    println!(
        "Captured frame seq={} avg_luma={:.1}",
        frame.sequence,
        frame.avg_luma()
    );
    let jpeg = frame.to_jpeg(90)?;
    println!("JPEG encodes to {} bytes", jpeg.len());
    Ok(())
}

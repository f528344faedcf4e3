use std::io::{self, Write};
use std::panic;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use gpx_cardio::{align_comparison, align_from_start, AlignedPoint, GpxCardio};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "GPX heart-rate plotting CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plot the heart-rate series of a single GPX recording
    Plot(PlotArgs),
    /// Overlay the heart-rate series of two GPX recordings
    Compare(CompareArgs),
}

#[derive(Parser, Debug)]
struct PlotArgs {
    /// GPX file to ingest
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output PNG figure path
    #[arg(short, long, default_value = "cardio.png", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Output SVG figure path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Write the aligned series as CSV (`-` for stdout)
    #[arg(long, value_hint = ValueHint::FilePath)]
    csv: Option<PathBuf>,

    /// Verbose logging (per-sample extraction trace)
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct CompareArgs {
    /// GPX recording that starts first
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    first: PathBuf,

    /// GPX recording to overlay against the first
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    second: PathBuf,

    /// Legend label for the first recording
    #[arg(long, default_value = "1st HR")]
    label_a: String,

    /// Legend label for the second recording
    #[arg(long, default_value = "2nd HR")]
    label_b: String,

    /// Output PNG figure path
    #[arg(short, long, default_value = "compare.png", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Output SVG figure path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Verbose logging (per-sample extraction trace)
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug)]
enum ChartKind {
    Png,
    Svg,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match &cli.command {
        Command::Plot(args) => {
            if args.verbose {
                "debug"
            } else {
                "info"
            }
        }
        Command::Compare(args) => {
            if args.verbose {
                "debug"
            } else {
                "info"
            }
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Plot(args) => handle_plot(args),
        Command::Compare(args) => handle_compare(args),
    }
}

fn handle_plot(args: PlotArgs) -> Result<()> {
    let mut run = GpxCardio::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let samples = run
        .samples()
        .with_context(|| format!("failed to extract {}", args.input.display()))?;
    info!(
        "Extracted {} heart-rate samples from {}",
        samples.len(),
        args.input.display()
    );

    let aligned = align_from_start(samples)
        .with_context(|| format!("no heart-rate data in {}", args.input.display()))?;

    if let Some(csv_path) = args.csv.as_ref() {
        if csv_path.as_os_str() == "-" {
            write_series_stdout(&aligned)?;
        } else {
            write_series_csv(&aligned, csv_path)?;
            info!("Wrote series CSV: {}", csv_path.display());
        }
    }

    if let Err(err) = render_single_guard(&aligned, &args.output, ChartKind::Png) {
        warn!("Skipping PNG render ({}): {}", args.output.display(), err);
    } else {
        info!("Wrote plot: {}", args.output.display());
    }

    if let Some(path) = args.svg.as_ref() {
        if let Err(err) = render_single_guard(&aligned, path, ChartKind::Svg) {
            warn!("Skipping SVG render ({}): {}", path.display(), err);
        } else {
            info!("Wrote plot: {}", path.display());
        }
    }

    Ok(())
}

fn handle_compare(args: CompareArgs) -> Result<()> {
    let mut first = GpxCardio::open(&args.first)
        .with_context(|| format!("failed to open {}", args.first.display()))?;
    let mut second = GpxCardio::open(&args.second)
        .with_context(|| format!("failed to open {}", args.second.display()))?;

    let samples_a = first
        .samples()
        .with_context(|| format!("failed to extract {}", args.first.display()))?
        .to_vec();
    let samples_b = second
        .samples()
        .with_context(|| format!("failed to extract {}", args.second.display()))?
        .to_vec();
    info!(
        "Extracted {} + {} heart-rate samples",
        samples_a.len(),
        samples_b.len()
    );

    // The first file is assumed to start no later than the second; the
    // shared origin is its first sample.
    let (aligned_a, aligned_b) = align_comparison(&samples_a, &samples_b)
        .with_context(|| format!("no heart-rate data in {}", args.first.display()))?;

    let overlay = CompareChart {
        series_a: &aligned_a,
        series_b: &aligned_b,
        label_a: &args.label_a,
        label_b: &args.label_b,
    };

    if let Err(err) = render_compare_guard(&overlay, &args.output, ChartKind::Png) {
        warn!("Skipping PNG render ({}): {}", args.output.display(), err);
    } else {
        info!("Wrote plot: {}", args.output.display());
    }

    if let Some(path) = args.svg.as_ref() {
        if let Err(err) = render_compare_guard(&overlay, path, ChartKind::Svg) {
            warn!("Skipping SVG render ({}): {}", path.display(), err);
        } else {
            info!("Wrote plot: {}", path.display());
        }
    }

    Ok(())
}

fn write_series_stdout(aligned: &[AlignedPoint]) -> Result<()> {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());
    write_series_rows(aligned, &mut writer)
}

fn write_series_csv(aligned: &[AlignedPoint], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_series_rows(aligned, &mut writer)
}

fn write_series_rows<W: Write>(aligned: &[AlignedPoint], writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["elapsed_s", "heart_rate_bpm"])?;
    for (elapsed, bpm) in aligned {
        writer.write_record([elapsed.to_string(), format!("{}", bpm)])?;
    }
    writer.flush()?;
    Ok(())
}

struct CompareChart<'a> {
    series_a: &'a [AlignedPoint],
    series_b: &'a [AlignedPoint],
    label_a: &'a str,
    label_b: &'a str,
}

// Plotting backends can panic (missing fonts, headless environments); the
// guards turn that into an error the caller can log past.

fn render_single_guard(
    aligned: &[AlignedPoint],
    path: &Path,
    kind: ChartKind,
) -> Result<(), String> {
    let render = || -> Result<(), String> {
        match kind {
            ChartKind::Png => {
                let root = BitMapBackend::new(path, (1280, 760)).into_drawing_area();
                draw_single_chart(root, aligned).map_err(|e| format!("plotting error: {}", e))
            }
            ChartKind::Svg => {
                let root = SVGBackend::new(path, (1280, 760)).into_drawing_area();
                draw_single_chart(root, aligned).map_err(|e| format!("plotting error: {}", e))
            }
        }
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_compare_guard(
    overlay: &CompareChart<'_>,
    path: &Path,
    kind: ChartKind,
) -> Result<(), String> {
    let render = || -> Result<(), String> {
        match kind {
            ChartKind::Png => {
                let root = BitMapBackend::new(path, (1280, 760)).into_drawing_area();
                draw_compare_chart(root, overlay).map_err(|e| format!("plotting error: {}", e))
            }
            ChartKind::Svg => {
                let root = SVGBackend::new(path, (1280, 760)).into_drawing_area();
                draw_compare_chart(root, overlay).map_err(|e| format!("plotting error: {}", e))
            }
        }
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn draw_single_chart<DB>(
    root: DrawingArea<DB, plotters::coord::Shift>,
    aligned: &[AlignedPoint],
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (x_min, x_max) = elapsed_bounds(&[aligned]);
    let (y_min, y_max) = value_bounds(&[aligned]);

    let area = root;
    area.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&area)
        .margin(25)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    let axis_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);
    chart
        .configure_mesh()
        .light_line_style(&TRANSPARENT)
        .bold_line_style(&TRANSPARENT)
        .x_desc("Seconds from beginning")
        .y_desc("Heart Rate [bpm]")
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(axis_font.clone().color(&BLACK.mix(0.85)))
        .axis_desc_style(axis_font)
        .draw()?;

    chart.draw_series(
        aligned
            .iter()
            .map(|&(t, bpm)| Circle::new((t as f64, bpm), 3, RED.filled())),
    )?;

    area.present()?;
    Ok(())
}

fn draw_compare_chart<DB>(
    root: DrawingArea<DB, plotters::coord::Shift>,
    overlay: &CompareChart<'_>,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (x_min, x_max) = elapsed_bounds(&[overlay.series_a, overlay.series_b]);
    let (y_min, y_max) = value_bounds(&[overlay.series_a, overlay.series_b]);

    let area = root;
    area.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&area)
        .margin(25)
        .caption(
            "Heart Rate Monitor Comparison",
            FontDesc::new(FontFamily::SansSerif, 26.0, FontStyle::Normal),
        )
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    let axis_font = FontDesc::new(FontFamily::SansSerif, 18.0, FontStyle::Normal);
    chart
        .configure_mesh()
        .x_desc("Seconds from beginning")
        .y_desc("Heart Rate [bpm]")
        .x_label_formatter(&|v| format!("{:.0}", v))
        .y_label_formatter(&|v| format!("{:.0}", v))
        .label_style(axis_font.clone().color(&BLACK.mix(0.85)))
        .axis_desc_style(axis_font)
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            overlay.series_a.iter().map(|&(t, bpm)| (t as f64, bpm)),
            &RED,
        ))?
        .label(overlay.label_a.to_string())
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], &RED));

    chart
        .draw_series(LineSeries::new(
            overlay.series_b.iter().map(|&(t, bpm)| (t as f64, bpm)),
            &BLUE,
        ))?
        .label(overlay.label_b.to_string())
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], &BLUE));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.7))
        .border_style(&BLACK.mix(0.3))
        .label_font(FontDesc::new(FontFamily::SansSerif, 16.0, FontStyle::Normal).color(&BLACK))
        .position(SeriesLabelPosition::LowerRight)
        .draw()?;

    area.present()?;
    Ok(())
}

fn elapsed_bounds(series: &[&[AlignedPoint]]) -> (f64, f64) {
    let mut lo = 0i64;
    let mut hi = 1i64;
    for s in series {
        for &(t, _) in *s {
            lo = lo.min(t);
            hi = hi.max(t);
        }
    }
    (lo as f64, hi as f64 * 1.02)
}

fn value_bounds(series: &[&[AlignedPoint]]) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for s in series {
        for &(_, bpm) in *s {
            lo = lo.min(bpm);
            hi = hi.max(bpm);
        }
    }
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let span = (hi - lo).max(1.0);
    (lo - span * 0.08, hi + span * 0.08)
}

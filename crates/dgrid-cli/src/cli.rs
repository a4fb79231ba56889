use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use dgrid_core::geometry::{Bounds, Size};
use dgrid_layout::resolver::{calculate_available_space, find_optimal_position};
use dgrid_layout::snapshot::{PanelRecord, migrate_snapshot};
use dgrid_layout::{
    LayoutConfig, LayoutSnapshot, OptimizeOptions, Panel, PlacementStrategy, optimize_layout,
    validate_layout,
};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{CliError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "dgrid",
    about = "Validate, repair, and query dgrid layout snapshots",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Report overlaps, size-limit and containment problems.
    Validate(LayoutArgs),

    /// Separate overlapping panels and optionally compact the layout.
    Optimize(OptimizeArgs),

    /// Find the nearest free spot for a new panel.
    Place(PlaceArgs),

    /// Report the free area left in the container.
    Space(LayoutArgs),
}

/// Input shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct LayoutArgs {
    /// Layout snapshot JSON file.
    pub input: PathBuf,

    /// Layout config JSON file; missing fields use defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value_t = 1200.0)]
    pub container_width: f64,

    #[arg(long, default_value_t = 800.0)]
    pub container_height: f64,

    /// Override the config's grid size.
    #[arg(long)]
    pub grid: Option<f64>,

    /// Override the config's minimum gap between panels.
    #[arg(long)]
    pub gap: Option<f64>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Snap to the grid and slide panels up and left.
    #[arg(long)]
    pub compact: bool,

    /// Write the repaired snapshot here instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct PlaceArgs {
    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Width of the panel to place.
    #[arg(long)]
    pub width: f64,

    /// Height of the panel to place.
    #[arg(long)]
    pub height: f64,
}

/// A parsed snapshot plus the settings it is checked against.
struct LoadedLayout {
    snapshot: LayoutSnapshot,
    panels: Vec<Panel>,
    container: Bounds,
    config: LayoutConfig,
}

impl LoadedLayout {
    fn visible_bounds(&self) -> Vec<Bounds> {
        self.panels
            .iter()
            .filter(|panel| panel.visible)
            .map(Panel::bounds)
            .collect()
    }
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(cli, &mut out)
}

/// Run `cli`, writing reports to `out`.
pub fn execute(cli: Cli, out: &mut impl Write) -> Result<()> {
    match cli.command {
        Commands::Validate(args) => run_validate(&args, out),
        Commands::Optimize(args) => run_optimize(&args, out),
        Commands::Place(args) => run_place(&args, out),
        Commands::Space(args) => run_space(&args, out),
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| CliError::io(path, err))
}

fn load_config(args: &LayoutArgs) -> Result<LayoutConfig> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_str::<LayoutConfig>(&read_file(path)?)?,
        None => LayoutConfig::default(),
    };
    if let Some(grid) = args.grid {
        config = config.with_grid_size(grid);
    }
    if let Some(gap) = args.gap {
        config = config.with_min_gap(gap);
    }
    config.validate()?;
    Ok(config)
}

/// Parse the snapshot into loose panels.
///
/// Panels are not loaded into a store, so layouts that break the commit
/// invariants can still be reported on and repaired.
fn load_layout(args: &LayoutArgs) -> Result<LoadedLayout> {
    let container = Size::new(args.container_width, args.container_height);
    if !container.is_finite() || container.is_empty() {
        return Err(CliError::invalid(format!(
            "container must be positive and finite, got {}x{}",
            container.width, container.height
        )));
    }
    let config = load_config(args)?;

    let migrated = migrate_snapshot(LayoutSnapshot::from_json(&read_file(&args.input)?)?)?;
    for warning in &migrated.warnings {
        warn!(input = %args.input.display(), "{warning}");
    }
    let snapshot = migrated.snapshot;
    snapshot.validate()?;

    let panels: Vec<Panel> = snapshot
        .panels
        .iter()
        .cloned()
        .map(PanelRecord::into_panel)
        .collect();
    debug!(
        input = %args.input.display(),
        panels = panels.len(),
        "loaded layout snapshot"
    );

    Ok(LoadedLayout {
        snapshot,
        panels,
        container: Bounds::from_size(container),
        config,
    })
}

fn run_validate(args: &LayoutArgs, out: &mut impl Write) -> Result<()> {
    let layout = load_layout(args)?;
    let report = validate_layout(&layout.panels, &layout.container, layout.config.min_gap);

    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    } else if report.errors.is_empty() {
        writeln!(out, "ok: {} panel(s), no issues", layout.panels.len())?;
    } else {
        for issue in &report.errors {
            let severity = serde_json::to_value(issue.severity)?;
            let code = serde_json::to_value(issue.code)?;
            let severity = severity.as_str().unwrap_or("issue");
            let code = code.as_str().unwrap_or("unknown");
            match issue.related_panel {
                Some(other) => writeln!(
                    out,
                    "{severity} {code} panel {} (with {other}): {}",
                    issue.panel, issue.message
                )?,
                None => writeln!(
                    out,
                    "{severity} {code} panel {}: {}",
                    issue.panel, issue.message
                )?,
            }
        }
    }

    if report.has_errors() {
        let errors = report
            .errors
            .iter()
            .filter(|issue| issue.severity == dgrid_layout::optimizer::IssueSeverity::Error)
            .count();
        return Err(CliError::InvalidLayout { errors });
    }
    Ok(())
}

fn run_optimize(args: &OptimizeArgs, out: &mut impl Write) -> Result<()> {
    let layout = load_layout(&args.layout)?;
    let options = OptimizeOptions::from_config(&layout.config).compact(args.compact);
    let report = optimize_layout(&layout.panels, &layout.container, &options);
    if !report.converged {
        warn!(
            passes = report.passes,
            "overlap separation stopped before converging"
        );
    }

    let mut snapshot = layout.snapshot;
    snapshot.panels = report.panels.iter().map(PanelRecord::from).collect();
    snapshot.canonicalize();
    let rendered = snapshot.to_json()?;

    let Some(path) = &args.output else {
        writeln!(out, "{rendered}")?;
        return Ok(());
    };
    std::fs::write(path, format!("{rendered}\n")).map_err(|err| CliError::io(path, err))?;

    let moved: Vec<u64> = report.moved.iter().map(|id| id.get()).collect();
    if args.layout.json {
        let summary = json!({
            "output": path.display().to_string(),
            "passes": report.passes,
            "converged": report.converged,
            "moved": moved,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
    } else {
        writeln!(
            out,
            "wrote {}: moved {} panel(s) in {} pass(es)",
            path.display(),
            moved.len(),
            report.passes
        )?;
    }
    Ok(())
}

fn run_place(args: &PlaceArgs, out: &mut impl Write) -> Result<()> {
    let size = Size::new(args.width, args.height);
    if !size.is_finite() || size.is_empty() {
        return Err(CliError::invalid(format!(
            "panel size must be positive and finite, got {}x{}",
            size.width, size.height
        )));
    }
    let layout = load_layout(&args.layout)?;
    let placement = find_optimal_position(
        size,
        &layout.visible_bounds(),
        &layout.container,
        layout.config.min_gap,
        &layout.config.search(),
    );
    let fits = layout
        .container
        .contains(&Bounds::from_parts(placement.position, size));

    if args.layout.json {
        let (strategy, detail) = match placement.strategy {
            PlacementStrategy::Desired => ("desired", None),
            PlacementStrategy::RingSearch { ring } => ("ring_search", Some(ring)),
            PlacementStrategy::Stacked { attempt } => ("stacked", Some(attempt)),
            PlacementStrategy::BelowAll => ("below_all", None),
        };
        let value = json!({
            "position": placement.position,
            "strategy": strategy,
            "strategy_step": detail,
            "iterations": placement.iterations,
            "fits_container": fits,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
    } else {
        let how = match placement.strategy {
            PlacementStrategy::Desired => "preferred spot".to_owned(),
            PlacementStrategy::RingSearch { ring } => format!("ring search, ring {ring}"),
            PlacementStrategy::Stacked { attempt } => format!("stacking, attempt {attempt}"),
            PlacementStrategy::BelowAll => "below all panels".to_owned(),
        };
        writeln!(
            out,
            "place at ({}, {}) via {how} after {} candidate(s){}",
            placement.position.x,
            placement.position.y,
            placement.iterations,
            if fits { "" } else { "; outside the container" }
        )?;
    }
    Ok(())
}

fn run_space(args: &LayoutArgs, out: &mut impl Write) -> Result<()> {
    let layout = load_layout(args)?;
    let space = calculate_available_space(&layout.visible_bounds(), &layout.container);

    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&space)?)?;
    } else {
        writeln!(
            out,
            "free area {} of {} in {} region(s)",
            space.total_area,
            layout.container.area(),
            space.regions.len()
        )?;
        for region in &space.regions {
            writeln!(
                out,
                "  {}x{} at ({}, {})",
                region.width, region.height, region.x, region.y
            )?;
        }
    }
    Ok(())
}

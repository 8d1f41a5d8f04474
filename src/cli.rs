use crate::config::{Config, load_config};
use crate::gateway::{DirGateway, TreeGateway};
use crate::interaction::Selection;
use crate::model::DiagramData;
use crate::render::{fit_viewport, render_svg, write_output_svg};
use crate::route_dump::write_route_dump;
use crate::routing::route_document;
use crate::scene::{RenderContext, Scene};
use crate::viewport::Viewport;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "ftree", version, about = "Family tree canvas: render and manage stored trees")]
pub struct Args {
    /// Directory holding stored trees and uploaded photos
    #[arg(short = 's', long = "store", global = true, default_value = "trees")]
    pub store: PathBuf,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long = "logLevel", global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a tree document to SVG or PNG
    Render(RenderArgs),
    /// List stored trees, most recently updated first
    List,
    /// Create an empty tree and print its id
    Create {
        /// Tree name
        name: Option<String>,
    },
    /// Delete a stored tree and its photos
    Delete { id: String },
    /// Upload a photo and attach it to a person card
    Upload {
        /// Tree id
        id: String,
        /// Image file (png, jpg, jpeg, gif, webp)
        file: PathBuf,
        /// Person to attach the photo to
        #[arg(short = 'p', long = "person")]
        person: String,
    },
}

#[derive(clap::Args, Debug)]
pub struct RenderArgs {
    /// Document file (.json) or '-' for stdin; ignored when --id is given
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Render a stored tree instead of a file
    #[arg(long = "id")]
    pub id: Option<String>,

    /// Output file (svg/png). Defaults to stdout for SVG if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "svg")]
    pub output_format: OutputFormat,

    /// Config JSON/JSON5 file (theme, themeVariables, canvas, render)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Canvas width when rendering the saved viewport
    #[arg(short = 'w', long = "width")]
    pub width: Option<f32>,

    /// Canvas height when rendering the saved viewport
    #[arg(short = 'H', long = "height")]
    pub height: Option<f32>,

    /// Render the saved viewport instead of fitting the content
    #[arg(long = "savedViewport")]
    pub saved_viewport: bool,

    /// Also write routed connector geometry as JSON
    #[arg(long = "routes")]
    pub routes: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Svg,
    Png,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    crate::logging::init(&args.log_level).map_err(anyhow::Error::msg)?;

    match args.command {
        Command::Render(render) => run_render(&args.store, render),
        Command::List => {
            let gateway = DirGateway::open(&args.store)?;
            for tree in gateway.list_trees()? {
                println!("{}\t{}\t{}", tree.id, tree.updated_at.to_rfc3339(), tree.name);
            }
            Ok(())
        }
        Command::Create { name } => {
            let mut gateway = DirGateway::open(&args.store)?;
            let tree = gateway.create_tree(name.as_deref())?;
            println!("{}", tree.id);
            Ok(())
        }
        Command::Delete { id } => {
            let mut gateway = DirGateway::open(&args.store)?;
            gateway.delete_tree(&id)?;
            Ok(())
        }
        Command::Upload { id, file, person } => {
            let mut gateway = DirGateway::open(&args.store)?;
            let mut tree = gateway.fetch_tree(&id)?;
            if tree.data.person(&person).is_none() {
                return Err(anyhow::anyhow!("No person '{person}' in tree {id}"));
            }
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let file_name = file
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();
            let url = gateway.upload_photo(&id, file_name, &bytes)?;
            tree.data.set_photo(&person, url.clone());
            gateway.replace_tree(&id, &tree.name, &tree.data)?;
            println!("{url}");
            Ok(())
        }
    }
}

fn run_render(store: &Path, args: RenderArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(width) = args.width {
        config.canvas.width = width.max(1.0);
    }
    if let Some(height) = args.height {
        config.canvas.height = height.max(1.0);
    }
    if args.saved_viewport {
        config.render.fit_content = false;
    }

    let (mut data, gateway) = match &args.id {
        Some(id) => {
            let gateway = DirGateway::open(store)?;
            (gateway.fetch_tree(id)?.data, Some(gateway))
        }
        None => (parse_document(&read_input(args.input.as_deref())?)?, None),
    };
    if let Some(gateway) = &gateway {
        resolve_photo_paths(&mut data, gateway);
    }

    let routes = route_document(&data);
    if let Some(path) = &args.routes {
        write_route_dump(path, &routes, &data)?;
    }

    let (scene, viewport) = build_scene(&data, &routes, &config);
    info!(
        "event=render module=cli status=ok persons={} edges={} segments={}",
        data.nodes.len(),
        data.edges.len(),
        routes.len()
    );
    let svg = render_svg(&scene, &viewport, &config.theme, &config.render);
    match args.output_format {
        OutputFormat::Svg => write_output_svg(&svg, args.output.as_deref()),
        OutputFormat::Png => {
            let output = ensure_output(&args.output, "png")?;
            write_png(&svg, &output, gateway.as_ref().map(DirGateway::root))
        }
    }
}

fn build_scene(data: &DiagramData, routes: &crate::routing::Routes, config: &Config) -> (Scene, Viewport) {
    let image_sizes = HashMap::new();
    let ctx = RenderContext {
        selection: &Selection::None,
        image_sizes: &image_sizes,
        theme: &config.theme,
    };
    let scene = Scene::build(data, routes, ctx);

    let mut saved = Viewport::new(config.canvas.width, config.canvas.height);
    saved.restore(&data.viewport);
    let viewport = if config.render.fit_content {
        fit_viewport(&scene, &config.render, saved)
    } else {
        saved
    };
    (scene, viewport)
}

/// Accepts either a bare document or a stored tree record with a `data` field.
fn parse_document(input: &str) -> Result<DiagramData> {
    let value: serde_json::Value = serde_json::from_str(input).context("parsing tree document")?;
    let document = match value.get("data") {
        Some(data) if data.is_object() => data.clone(),
        _ => value,
    };
    Ok(serde_json::from_value(document)?)
}

/// Points photo refs of a stored tree at the uploaded files on disk.
fn resolve_photo_paths(data: &mut DiagramData, gateway: &DirGateway) {
    for person in &mut data.nodes {
        if let Some(path) = person.photo_ref.as_deref().and_then(|url| gateway.photo_path(url))
            && path.exists()
        {
            person.photo_ref = Some(path.to_string_lossy().into_owned());
        }
    }
}

#[cfg(feature = "png")]
fn write_png(svg: &str, output: &Path, resources_dir: Option<&Path>) -> Result<()> {
    crate::render::write_output_png(svg, output, resources_dir)
}

#[cfg(not(feature = "png"))]
fn write_png(_svg: &str, _output: &Path, _resources_dir: Option<&Path>) -> Result<()> {
    Err(anyhow::anyhow!("PNG output requires the 'png' feature"))
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}

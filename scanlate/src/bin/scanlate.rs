//! Command-line front end for the scanlate text annotation model.

use std::{
    fs::{read_to_string, File},
    io::{stdin, stdout, BufWriter, Read},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use scanlate::{
    exchange::{
        generate_for_translate_content, generate_retranslate_content,
        import_translation_file_content,
    },
    fragment::{filter_detections, RawDetection},
    merge::group_and_merge,
    profiles::{ProfileData, ProfileStore, ORIGINAL_PROFILE},
    project::{load_rows, save_rows},
    rows::RowStore,
    Result,
};

#[derive(Debug, Parser)]
/// Text annotation tools for scanlation projects: group raw OCR
/// detections into text rows, and move rows through the translation
/// exchange format.
#[command(name = "scanlate", version)]
enum Args {
    /// Group raw OCR detections into merged text rows.
    #[command(name = "group")]
    Group {
        /// Path to a JSON file of detections ([polygon, text,
        /// confidence] triples), or "-" for stdin.
        detections: PathBuf,

        /// Image filename to attach to the merged rows.
        #[arg(long)]
        filename: String,

        /// Maximum pixel gap between boxes that still merges them.
        #[arg(long, default_value = "20")]
        distance_threshold: i32,

        /// Minimum text height in pixels.
        #[arg(long, default_value = "5")]
        min_height: i32,

        /// Maximum text height in pixels.
        #[arg(long, default_value = "200")]
        max_height: i32,

        /// Minimum detector confidence.
        #[arg(long, default_value = "0.1")]
        min_confidence: f32,

        /// Horizontal scale to map detection coordinates back to the
        /// original image (inverse of the pre-OCR resize ratio).
        #[arg(long, default_value = "1.0")]
        scale_x: f64,

        /// Vertical scale to map detection coordinates back to the
        /// original image.
        #[arg(long, default_value = "1.0")]
        scale_y: f64,

        /// First row number to assign.
        #[arg(long, default_value = "0")]
        base: i64,

        /// Mark the merged rows as manually selected.
        #[arg(long)]
        manual: bool,
    },

    /// Generate a translation exchange document from a rows file.
    #[command(name = "export")]
    Export {
        /// Path to the project rows JSON file, or "-" for stdin.
        rows: PathBuf,

        /// Profile to take text from.
        #[arg(long, default_value = ORIGINAL_PROFILE)]
        profile: String,
    },

    /// Generate a selective re-translation document with context.
    #[command(name = "retranslate")]
    Retranslate {
        /// Path to the project rows JSON file, or "-" for stdin.
        rows: PathBuf,

        /// Rows to re-translate, as "filename:row" pairs.
        #[arg(long = "select", required = true)]
        selections: Vec<String>,

        /// Rows of surrounding context on each side of a selection.
        #[arg(long, default_value = "3")]
        context_size: usize,

        /// Profile to take text from.
        #[arg(long, default_value = ORIGINAL_PROFILE)]
        profile: String,
    },

    /// Parse a returned exchange document.
    #[command(name = "import")]
    Import {
        /// Path to the translated exchange document, or "-" for
        /// stdin.
        translation: PathBuf,

        /// Apply the translations to this rows file as a new profile
        /// instead of printing them as JSON.
        #[arg(long)]
        apply_to: Option<PathBuf>,

        /// Name for the imported profile.
        #[arg(long, default_value = "Imported Translation")]
        profile: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    match args {
        Args::Group {
            detections,
            filename,
            distance_threshold,
            min_height,
            max_height,
            min_confidence,
            scale_x,
            scale_y,
            base,
            manual,
        } => cmd_group(
            &detections,
            &filename,
            distance_threshold,
            min_height,
            max_height,
            min_confidence,
            (scale_x, scale_y),
            base,
            manual,
        ),
        Args::Export { rows, profile } => cmd_export(&rows, &profile),
        Args::Retranslate {
            rows,
            selections,
            context_size,
            profile,
        } => cmd_retranslate(&rows, &selections, context_size, &profile),
        Args::Import {
            translation,
            apply_to,
            profile,
        } => cmd_import(&translation, apply_to.as_deref(), &profile),
    }
}

/// Read a file, or stdin when the path is "-".
fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        stdin()
            .read_to_string(&mut buf)
            .context("could not read stdin")?;
        Ok(buf)
    } else {
        read_to_string(path)
            .with_context(|| format!("could not read file: {}", path.display()))
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_group(
    detections_path: &Path,
    filename: &str,
    distance_threshold: i32,
    min_height: i32,
    max_height: i32,
    min_confidence: f32,
    (scale_x, scale_y): (f64, f64),
    base: i64,
    manual: bool,
) -> Result<()> {
    let input = read_input(detections_path)?;
    let detections: Vec<RawDetection> =
        serde_json::from_str(&input).context("could not parse detections JSON")?;
    let fragments = filter_detections(
        detections,
        scale_x,
        scale_y,
        min_height,
        max_height,
        min_confidence,
    );
    let rows = group_and_merge(fragments, filename, distance_threshold, base, manual);
    serde_json::to_writer_pretty(BufWriter::new(stdout().lock()), &rows)?;
    println!();
    Ok(())
}

fn cmd_export(rows_path: &Path, profile: &str) -> Result<()> {
    let input = read_input(rows_path)?;
    let loaded = load_rows(input.as_bytes())?;
    print!("{}", generate_for_translate_content(&loaded.rows, profile));
    Ok(())
}

fn cmd_retranslate(
    rows_path: &Path,
    selections: &[String],
    context_size: usize,
    profile: &str,
) -> Result<()> {
    let input = read_input(rows_path)?;
    let loaded = load_rows(input.as_bytes())?;

    let mut parsed = vec![];
    for selection in selections {
        let Some((filename, row)) = selection.rsplit_once(':') else {
            bail!("selection must look like \"filename:row\": {:?}", selection);
        };
        parsed.push((filename.to_owned(), row.to_owned()));
    }

    print!(
        "{}",
        generate_retranslate_content(&loaded.rows, profile, &parsed, context_size)
    );
    Ok(())
}

fn cmd_import(
    translation_path: &Path,
    apply_to: Option<&Path>,
    profile: &str,
) -> Result<()> {
    let input = read_input(translation_path)?;
    let translations = import_translation_file_content(&input);

    let Some(rows_path) = apply_to else {
        serde_json::to_writer_pretty(BufWriter::new(stdout().lock()), &translations)?;
        println!();
        return Ok(());
    };

    // Merge the parsed document into the rows file as a new profile.
    let loaded = load_rows(File::open(rows_path).with_context(|| {
        format!("could not open rows file: {}", rows_path.display())
    })?)?;
    let mut store = RowStore::from_rows(loaded.rows);
    let mut profiles = ProfileStore::new();
    profiles.load_from_results(store.rows());

    let data: ProfileData = translations.into_iter().collect();
    let (final_name, _) = profiles.add_profile(profile, data);

    scanlate::project::apply_profiles_to_rows(&mut store, &profiles);
    let out = File::create(rows_path).with_context(|| {
        format!("could not write rows file: {}", rows_path.display())
    })?;
    save_rows(BufWriter::new(out), &mut store)?;
    eprintln!("applied translations as profile {:?}", final_name);
    Ok(())
}

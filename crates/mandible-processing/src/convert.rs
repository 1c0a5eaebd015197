//! Wrappers around the external image tools.
//!
//! Every operation reads a source path and writes a sibling output path
//! derived by suffixing the input (`_jpg`, `_q`, `_rp`, `_ort`, `_opti`,
//! `_{thumbName}`). The GraphicsMagick-family `convert` does the pixel
//! work; `jpegtran`, `optipng` and `exiftool` cover the lossless passes.

use std::path::{Path, PathBuf};

use mandible_core::ImageKind;

use crate::command::{run_command, suffixed_path, ProcessError};

pub const GM_COMMAND: &str = "convert";

/// Flatten any input into a baseline JPEG.
pub async fn convert_to_jpeg(input: &Path) -> Result<PathBuf, ProcessError> {
    let outfile = suffixed_path(input, "_jpg");

    let args = vec![
        display(input),
        "-flatten".to_string(),
        format!("JPEG:{}", outfile.display()),
    ];

    run_command(GM_COMMAND, &args).await?;
    Ok(outfile)
}

/// Normalise EXIF rotation into the pixel data.
pub async fn fix_orientation(input: &Path) -> Result<PathBuf, ProcessError> {
    let outfile = suffixed_path(input, "_ort");

    let args = vec![
        display(input),
        "-auto-orient".to_string(),
        display(&outfile),
    ];

    run_command(GM_COMMAND, &args).await?;
    Ok(outfile)
}

/// Re-encode at the given JPEG quality, normalised to 72dpi.
pub async fn quality(input: &Path, quality: u32) -> Result<PathBuf, ProcessError> {
    let outfile = suffixed_path(input, "_q");

    let args = vec![
        display(input),
        "-quality".to_string(),
        quality.to_string(),
        "-density".to_string(),
        "72x72".to_string(),
        display(&outfile),
    ];

    run_command(GM_COMMAND, &args).await?;
    Ok(outfile)
}

/// Resize to a percentage of the source dimensions.
pub async fn resize_percent(input: &Path, percent: u32) -> Result<PathBuf, ProcessError> {
    let outfile = suffixed_path(input, "_rp");

    let args = vec![
        display(input),
        "-resize".to_string(),
        format!("{}%", percent),
        display(&outfile),
    ];

    run_command(GM_COMMAND, &args).await?;
    Ok(outfile)
}

/// Cover-resize to `size`x`size`, centre-crop, light unsharp.
pub async fn square_thumb(
    input: &Path,
    name: &str,
    size: u32,
    format: ImageKind,
) -> Result<PathBuf, ProcessError> {
    let outfile = suffixed_path(input, &format!("_{}", name));

    let args = vec![
        first_frame(input),
        "-quality".to_string(),
        "94".to_string(),
        "-resize".to_string(),
        format!("{}x{}^", size, size),
        "-gravity".to_string(),
        "center".to_string(),
        "-crop".to_string(),
        format!("{}x{}+0+0", size, size),
        "-density".to_string(),
        "72x72".to_string(),
        "-unsharp".to_string(),
        "0.5".to_string(),
        output(format, &outfile),
    ];

    run_command(GM_COMMAND, &args).await?;
    Ok(outfile)
}

/// Fit within `width`x`height`, never enlarging, preserving aspect.
pub async fn thumb(
    input: &Path,
    name: &str,
    width: u32,
    height: u32,
    format: ImageKind,
) -> Result<PathBuf, ProcessError> {
    let outfile = suffixed_path(input, &format!("_{}", name));

    let args = vec![
        first_frame(input),
        "-quality".to_string(),
        "83".to_string(),
        "-resize".to_string(),
        format!("{}x{}>", width, height),
        "-density".to_string(),
        "72x72".to_string(),
        output(format, &outfile),
    ];

    run_command(GM_COMMAND, &args).await?;
    Ok(outfile)
}

/// Clip `input` with a circular alpha mask of the given diameter.
pub async fn circle_clip(
    input: &Path,
    name: &str,
    diameter: u32,
    format: ImageKind,
) -> Result<PathBuf, ProcessError> {
    let outfile = suffixed_path(input, &format!("_{}", name));

    let args = vec![
        "-size".to_string(),
        format!("{}x{}", diameter, diameter),
        "xc:none".to_string(),
        "-fill".to_string(),
        display(input),
        "-quality".to_string(),
        "83".to_string(),
        "-density".to_string(),
        "72x72".to_string(),
        "-draw".to_string(),
        format!(
            "circle {},{} {},1",
            diameter / 2,
            diameter / 2,
            diameter / 2
        ),
        output(format, &outfile),
    ];

    run_command(GM_COMMAND, &args).await?;
    Ok(outfile)
}

/// Crop (optionally, with gravity) then resize, with caller-chosen quality.
#[allow(clippy::too_many_arguments)]
pub async fn custom_thumb(
    input: &Path,
    name: &str,
    width: u32,
    height: u32,
    crop_gravity: &str,
    crop_width: u32,
    crop_height: u32,
    quality: u32,
    format: ImageKind,
) -> Result<PathBuf, ProcessError> {
    let outfile = suffixed_path(input, &format!("_{}", name));

    let mut args = vec![
        first_frame(input),
        "-quality".to_string(),
        quality.to_string(),
    ];

    if crop_width > 0 && crop_height > 0 {
        if !crop_gravity.is_empty() {
            args.push("-gravity".to_string());
            args.push(crop_gravity.to_string());
        }
        args.push("-crop".to_string());
        args.push(format!("{}x{}+0+0", crop_width, crop_height));
    }

    args.extend([
        "-resize".to_string(),
        format!("{}x{}>", width, height),
        "-density".to_string(),
        "72x72".to_string(),
        output(format, &outfile),
    ]);

    run_command(GM_COMMAND, &args).await?;
    Ok(outfile)
}

/// Transcode to the target format without resizing.
pub async fn full(input: &Path, name: &str, format: ImageKind) -> Result<PathBuf, ProcessError> {
    let outfile = suffixed_path(input, &format!("_{}", name));

    let args = vec![first_frame(input), output(format, &outfile)];

    run_command(GM_COMMAND, &args).await?;
    Ok(outfile)
}

/// Lossless JPEG re-encode.
pub async fn jpegtran(input: &Path) -> Result<PathBuf, ProcessError> {
    let outfile = suffixed_path(input, "_opti");

    let args = vec![
        "-copy".to_string(),
        "all".to_string(),
        "-optimize".to_string(),
        "-outfile".to_string(),
        display(&outfile),
        display(input),
    ];

    run_command("jpegtran", &args).await?;
    Ok(outfile)
}

/// Lossless PNG re-encode.
pub async fn optipng(input: &Path) -> Result<PathBuf, ProcessError> {
    let outfile = suffixed_path(input, "_opti");

    let args = vec![
        "-fix".to_string(),
        "-out".to_string(),
        display(&outfile),
        display(input),
    ];

    run_command("optipng", &args).await?;
    Ok(outfile)
}

/// Strip every metadata tag in place.
pub async fn strip_metadata(input: &Path) -> Result<(), ProcessError> {
    let args = vec![
        "-all=".to_string(),
        "--icc_profile:all".to_string(),
        "-overwrite_original".to_string(),
        display(input),
    ];

    run_command("exiftool", &args).await
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Select the first frame, so animated GIF inputs produce a single-frame
/// derivative.
fn first_frame(path: &Path) -> String {
    format!("{}[0]", path.display())
}

fn output(format: ImageKind, outfile: &Path) -> String {
    format!("{}:{}", format.gm_token(), outfile.display())
}

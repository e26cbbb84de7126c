use std::{env, fs, path::PathBuf, process::ExitCode};

use pyrite::{BundleMode, DirLoader, EntryPoint, StyleProcessor, Translator};

const USAGE: &str = "usage: pyrite module[:entry] [--args JSON] [--bundle loader|esm] [--css PROGRAM] [--out DIR]";

struct Options {
    seed: EntryPoint,
    mode: BundleMode,
    css_program: Option<String>,
    out_dir: PathBuf,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut seed: Option<EntryPoint> = None;
    let mut mode = BundleMode::Loader;
    let mut css_program = None;
    let mut out_dir = PathBuf::from(".");

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--bundle" => {
                let value = iter.next().ok_or("--bundle needs a value")?;
                mode = match value.as_str() {
                    "loader" => BundleMode::Loader,
                    "esm" => BundleMode::EsModules,
                    other => return Err(format!("unknown bundle mode `{other}`")),
                };
            }
            "--args" => {
                let value = iter.next().ok_or("--args needs a JSON list")?;
                let parsed: serde_json::Value =
                    serde_json::from_str(value).map_err(|e| format!("--args is not valid JSON: {e}"))?;
                let serde_json::Value::Array(list) = parsed else {
                    return Err("--args must be a JSON list".to_string());
                };
                if let Some(seed) = &mut seed {
                    seed.args = list;
                } else {
                    return Err("--args must come after the module argument".to_string());
                }
            }
            "--css" => {
                css_program = Some(iter.next().ok_or("--css needs a program name")?.clone());
            }
            "--out" => {
                out_dir = PathBuf::from(iter.next().ok_or("--out needs a directory")?);
            }
            other if other.starts_with("--") => return Err(format!("unknown flag `{other}`")),
            positional => {
                if seed.is_some() {
                    return Err("only one module argument is allowed".to_string());
                }
                seed = Some(EntryPoint::parse(positional));
            }
        }
    }

    Ok(Options {
        seed: seed.ok_or(USAGE)?,
        mode,
        css_program,
        out_dir,
    })
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let translator = match Translator::new(DirLoader::new([cwd])) {
        Ok(translator) => translator,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let bundle = match translator.translate(&options.seed, options.mode) {
        Ok(bundle) => bundle,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = fs::create_dir_all(&options.out_dir) {
        eprintln!("error: cannot create `{}`: {err}", options.out_dir.display());
        return ExitCode::FAILURE;
    }

    match &bundle.script {
        Some(script) => {
            let file = options
                .out_dir
                .join(format!("{}.{}.js", options.seed.module, options.seed.entry));
            eprintln!("transpiling {}:{} to {}", options.seed.module, options.seed.entry, file.display());
            if let Err(err) = fs::write(&file, script) {
                eprintln!("error: cannot write `{}`: {err}", file.display());
                return ExitCode::FAILURE;
            }
        }
        None => {
            for (name, source) in &bundle.modules {
                if source.trim().is_empty() {
                    continue;
                }
                let file = options.out_dir.join(format!("{name}.js"));
                eprintln!("transpiling {name} to {}", file.display());
                if let Err(err) = fs::write(&file, source) {
                    eprintln!("error: cannot write `{}`: {err}", file.display());
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    if let Some(program) = &options.css_program {
        if bundle.styles.is_empty() {
            eprintln!("no style classes collected, skipping css generation");
        } else {
            let css = match StyleProcessor::new(program).generate(&bundle.styles) {
                Ok(css) => css,
                Err(err) => {
                    eprintln!("error: {err}");
                    return ExitCode::FAILURE;
                }
            };
            let file = options.out_dir.join(format!("{}.css", options.seed.module));
            if let Err(err) = fs::write(&file, css) {
                eprintln!("error: cannot write `{}`: {err}", file.display());
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

//! Shared helpers for the integration suite: in-memory translation and
//! whitespace-tolerant text assertions with side-by-side diffs.
#![allow(dead_code)]

use pyrite::{Analysis, BundleMode, CompileResult, EntryPoint, MemLoader, Translator};

/// Analyzes a single `app` module with `main` as the entry point.
pub fn analyze_src(src: &str) -> CompileResult<Analysis> {
    analyze_modules(&[("app", src)])
}

/// Analyzes several modules; the entry point is `app:main`.
pub fn analyze_modules(modules: &[(&str, &str)]) -> CompileResult<Analysis> {
    let mut loader = MemLoader::new();
    for (name, src) in modules {
        loader = loader.with(*name, *src);
    }
    Translator::new(loader)?.analyze(&EntryPoint::parse("app:main"))
}

/// Analyzes one or more `;`-separated statements wrapped in a `main` body and
/// returns the annotated body text, one trimmed line per statement.
pub fn analyze_line(line: &str) -> CompileResult<String> {
    let body: Vec<String> = line.split(';').map(|stmt| format!("    {}", stmt.trim())).collect();
    let src = format!("def main():\n{}\n", body.join("\n"));
    let analysis = analyze_src(&src)?;
    let types = analysis.write_types("app").expect("app module is materialized");
    Ok(types
        .lines()
        .skip_while(|l| !l.starts_with("def main"))
        .skip(1)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Full annotated writeback of the `app` module.
pub fn analyze_types(src: &str) -> CompileResult<String> {
    let analysis = analyze_src(src)?;
    Ok(analysis.write_types("app").expect("app module is materialized"))
}

/// Emits the `app` module as an ES module.
pub fn transpile_src(src: &str) -> CompileResult<String> {
    analyze_src(src)?.emit("app", BundleMode::EsModules)
}

/// Strips the common leading indentation from an expected-text literal.
pub fn dedent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    text.lines()
        .map(|l| if l.len() >= indent { &l[indent..] } else { l })
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

/// Asserts two texts match after dedenting, printing a side-by-side diff on
/// mismatch.
pub fn assert_text(expected: &str, actual: &str) {
    let expected = dedent(expected);
    let actual = actual.trim_matches('\n').to_string();
    if expected == actual {
        return;
    }
    let diff = similar::TextDiff::from_lines(expected.as_str(), actual.as_str());
    let mut rendered = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "-",
            similar::ChangeTag::Insert => "+",
            similar::ChangeTag::Equal => " ",
        };
        rendered.push_str(&format!("{sign} {}", change));
    }
    panic!("texts do not match:\n{rendered}");
}

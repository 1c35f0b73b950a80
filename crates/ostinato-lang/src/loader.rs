//! Recursive import resolution and program loading.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use ostinato_vm::{Vm, VmOptions};
use tracing::debug;

use crate::error::{LangError, ParseError, ParseErrorKind};
use crate::fs::{case_resolve, find_file_recursive, FileIdentity};
use crate::parse::{parse_header, parse_toplevel};
use crate::preprocess::preprocess;
use crate::source::SourceUnit;

/// Recursion bound for the import graph.
pub const MAX_IMPORT_DEPTH: u32 = 32;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Parse the main header only; skip imports entirely.
    pub ignore_imports: bool,
}

/// A loaded main unit plus its imports in reverse-topological order
/// (dependencies first).
pub struct LoadedProgram {
    pub main: SourceUnit,
    pub imports: Vec<SourceUnit>,
}

/// Loads a main source and its import closure.
pub struct Loader {
    import_root: Option<PathBuf>,
    /// Preprocessor environment; seeded with host `config:` overrides,
    /// grown with each file's config defaults.
    env: HashMap<String, f64>,
    vm: Vm,
    seen: HashSet<FileIdentity>,
}

impl Loader {
    pub fn new(import_root: Option<PathBuf>, overrides: &HashMap<String, f64>) -> Self {
        Loader {
            import_root,
            env: overrides
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), *v))
                .collect(),
            vm: Vm::new(&VmOptions::default()),
            seen: HashSet::new(),
        }
    }

    pub fn load(&mut self, path: &Path, options: LoadOptions) -> Result<LoadedProgram, LangError> {
        let mut imports = Vec::new();
        let main = self.load_unit(path, options, 0, &mut imports)?;
        Ok(LoadedProgram { main, imports })
    }

    fn load_unit(
        &mut self,
        path: &Path,
        options: LoadOptions,
        depth: u32,
        imports: &mut Vec<SourceUnit>,
    ) -> Result<SourceUnit, LangError> {
        if depth > MAX_IMPORT_DEPTH {
            return Err(ParseError::new(0, "too many import levels")
                .with_kind(ParseErrorKind::ImportTooDeep)
                .in_file(path)
                .into());
        }

        let text =
            std::fs::read_to_string(path).map_err(|e| LangError::io(path.to_path_buf(), e))?;
        let identity = FileIdentity::of(path).map_err(|e| LangError::io(path.to_path_buf(), e))?;
        self.seen.insert(identity.clone());

        // config items must be known before preprocessing, so scan the raw
        // header first
        let raw_toplevel =
            parse_toplevel(&text, true).map_err(|e| e.in_file(path))?;
        let raw_header = parse_header(&raw_toplevel.header).map_err(|e| e.in_file(path))?;
        for item in &raw_header.config_items {
            self.env
                .entry(item.identifier.to_ascii_lowercase())
                .or_insert(item.default_value);
        }

        let expanded =
            preprocess(&text, &self.env, &mut self.vm).map_err(|e| e.in_file(path))?;

        let toplevel = if options.ignore_imports {
            parse_toplevel(&expanded, true)
        } else {
            parse_toplevel(&expanded, false)
        }
        .map_err(|e| e.in_file(path))?;
        let header = parse_header(&toplevel.header).map_err(|e| e.in_file(path))?;

        if !options.ignore_imports {
            let import_names = header.imports.clone();
            for name in &import_names {
                let Some(resolved) = self.resolve_import(path, name) else {
                    return Err(ParseError::new(0, format!("import not found: {name}"))
                        .with_kind(ParseErrorKind::ImportNotFound)
                        .in_file(path)
                        .into());
                };
                let child_identity = FileIdentity::of(&resolved)
                    .map_err(|e| LangError::io(resolved.clone(), e))?;
                if !self.seen.insert(child_identity) {
                    // already loaded (diamond or cycle); dedup keeps one copy
                    continue;
                }
                debug!(import = %resolved.display(), "resolving import");
                let unit = self.load_unit(&resolved, options, depth + 1, imports)?;
                imports.push(unit);
            }
        }

        Ok(SourceUnit {
            path: path.to_path_buf(),
            identity,
            text: expanded,
            toplevel,
            header,
        })
    }

    /// Resolve an import reference: the importing file's directory wins,
    /// then the import root, then a recursive search under both.
    pub fn resolve_import(&self, origin: &Path, name: &str) -> Option<PathBuf> {
        let origin_dir = origin.parent().unwrap_or(Path::new("."));

        if let Some(path) = case_resolve(origin_dir, name).into_path() {
            if path.is_file() {
                return Some(path);
            }
        }
        if let Some(root) = &self.import_root {
            if let Some(path) = case_resolve(root, name).into_path() {
                if path.is_file() {
                    return Some(path);
                }
            }
        }

        let leaf = name.rsplit(['/', '\\']).next().unwrap_or(name);
        if let Some(root) = &self.import_root {
            if let Some(path) = find_file_recursive(root, leaf) {
                return Some(path);
            }
        }
        find_file_recursive(origin_dir, leaf)
    }
}

/// Preprocessor utility: fully expand `input` and its import closure and
/// write the expanded sources into `out_dir`, flat by file name. Returns
/// the written paths, main file first.
pub fn expand_program_to_dir(
    input: &Path,
    import_root: Option<PathBuf>,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, LangError> {
    let mut loader = Loader::new(import_root, &HashMap::new());
    let program = loader.load(input, LoadOptions::default())?;

    std::fs::create_dir_all(out_dir).map_err(|e| LangError::io(out_dir.to_path_buf(), e))?;

    let mut written = Vec::new();
    for unit in std::iter::once(&program.main).chain(program.imports.iter()) {
        let name = unit
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "expanded.jsfx".to_string());
        let out_path = out_dir.join(name);
        std::fs::write(&out_path, &unit.text)
            .map_err(|e| LangError::io(out_path.clone(), e))?;
        written.push(out_path);
    }
    Ok(written)
}

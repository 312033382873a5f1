//! Lecteur de ressources Servo.
//!
//! Servo a besoin d'un ensemble de fichiers de ressources (préférences,
//! certificats, domaines publics, etc.) pour fonctionner. L'embedder doit
//! fournir une implémentation de `ResourceReaderMethods` et l'enregistrer via
//! `servo::resources::set()`.
//!
//! Ce module cherche le dossier `resources/` dans les chemins suivants :
//! 1. Variable d'environnement `SERVO_RESOURCES_PATH`
//! 2. À côté de l'exécutable (`<exe_dir>/resources/`)
//! 3. Racine du projet si l'exécutable est dans `target/`
//! 4. Dans le répertoire courant (`./resources/`)
//!
//! Un candidat n'est retenu que s'il contient vraiment les ressources du
//! moteur (voir [`is_engine_resources`]). Le dossier est résolu une seule
//! fois, au démarrage : une borne de signalisation sans ressources doit
//! échouer tout de suite, pas en pleine session.

use std::path::{Path, PathBuf};
use std::{env, fs};

use servo::resources::{self, Resource};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(
        "Servo 'resources/' directory with the engine's files not found; set SERVO_RESOURCES_PATH or \
         place it next to the executable"
    )]
    NotFound,
    #[error("cannot canonicalize resources directory {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Initialise le lecteur de ressources Servo.
///
/// **Doit être appelé avant `ServoBuilder::build()`**, sinon Servo
/// paniquera avec "Resource reader not set".
pub fn init() -> Result<PathBuf, ResourceError> {
    let dir = find_resources_dir().ok_or(ResourceError::NotFound)?;
    let root = dir
        .canonicalize()
        .map_err(|source| ResourceError::Canonicalize { path: dir, source })?;
    info!(path = %root.display(), "Servo resources");
    resources::set(Box::new(ResourceReader { root: root.clone() }));
    Ok(root)
}

struct ResourceReader {
    /// Déjà canonicalisé.
    root: PathBuf,
}

impl resources::ResourceReaderMethods for ResourceReader {
    fn read(&self, file: Resource) -> Vec<u8> {
        match read_within(&self.root, file.filename()) {
            Ok(bytes) => bytes,
            Err(message) => {
                error!(resource = file.filename(), "{message}");
                Vec::new()
            }
        }
    }

    fn sandbox_access_files_dirs(&self) -> Vec<PathBuf> {
        vec![self.root.clone()]
    }

    fn sandbox_access_files(&self) -> Vec<PathBuf> {
        vec![]
    }
}

/// Lit `name` sous `root`, en refusant tout chemin qui en sort
/// (`../`, liens symboliques).
fn read_within(root: &Path, name: &str) -> Result<Vec<u8>, String> {
    let canonical = root
        .join(name)
        .canonicalize()
        .map_err(|e| format!("Invalid resource path: {e}"))?;

    if !canonical.starts_with(root) {
        return Err(format!(
            "Path traversal attempt blocked: {}",
            canonical.display()
        ));
    }

    fs::read(&canonical).map_err(|e| format!("Cannot read {}: {e}", canonical.display()))
}

/// Un dossier `resources/` quelconque ne suffit pas : il doit contenir un
/// fichier que Servo lit à chaque démarrage.
fn is_engine_resources(dir: &Path) -> bool {
    dir.join(Resource::DomainList.filename()).is_file()
}

fn find_resources_dir() -> Option<PathBuf> {
    // 1. Variable d'environnement SERVO_RESOURCES_PATH
    if let Ok(path) = env::var("SERVO_RESOURCES_PATH") {
        let path = PathBuf::from(path);
        if is_engine_resources(&path) {
            return Some(path);
        }
    }

    // 2. À côté de l'exécutable
    if let Ok(exe_path) = env::current_exe()
        && let Ok(canonical) = exe_path.canonicalize()
    {
        let exe_dir = canonical.parent().unwrap_or(&canonical);
        let path = exe_dir.join("resources");
        if is_engine_resources(&path) {
            return Some(path);
        }

        // 3. Si l'exécutable est dans target/{debug,release}/, remonter
        //    au projet root (typique pendant le développement avec cargo).
        if let Some(target_dir) = exe_dir.parent()
            && target_dir.file_name().is_some_and(|n| n == "target")
            && let Some(project_root) = target_dir.parent()
        {
            let path = project_root.join("resources");
            if is_engine_resources(&path) {
                return Some(path);
            }
        }
    }

    // 4. Répertoire courant
    let path = env::current_dir().ok()?.join("resources");
    is_engine_resources(&path).then_some(path)
}

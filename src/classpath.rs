//! Finds class files by fully qualified name.
//!
//! A [`ClassPath`] is an ordered list of directories and `.jar`/`.zip` archives, followed by the
//! classes of the JDK found under `JAVA_HOME`. On Java 9 and later those live in
//! `jmods/java.base.jmod`, a zip archive behind a four byte `JM` header whose entries sit under
//! `classes/`. Older JDKs ship them in `rt.jar`.
use std::env;
use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

const JMOD_MAGIC: [u8; 2] = [0x4A, 0x4D];
const JMOD_CLASSES: &str = "classes/";

#[derive(Debug, Error)]
pub enum ClassLookupError {
    #[error("class {name} not found in {searched:?} ({runtime})")]
    NotFound {
        name: String,
        searched: Vec<PathBuf>,
        runtime: JdkRuntime,
    },
    #[error("cannot read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot read archive {path:?}")]
    Archive {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("{path:?} is not a jmod file")]
    NotAJmod { path: PathBuf },
}

///One place classes are looked up in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassPathEntry {
    Directory(PathBuf),
    ///A `.jar` or `.zip` file.
    Archive(PathBuf),
    ///A `.jmod` file.
    Jmod(PathBuf),
}

impl ClassPathEntry {
    ///Picks the kind of entry from the file extension.
    pub fn from_path(path: PathBuf) -> ClassPathEntry {
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("jar") | Some("zip") => ClassPathEntry::Archive(path),
            Some("jmod") => ClassPathEntry::Jmod(path),
            _ => ClassPathEntry::Directory(path),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ClassPathEntry::Directory(p) | ClassPathEntry::Archive(p) | ClassPathEntry::Jmod(p) => p,
        }
    }

    ///The bytes of the class file `entry` (`java/lang/Runnable.class`), if this entry has it.
    fn read(&self, entry: &str) -> Result<Option<Vec<u8>>, ClassLookupError> {
        match self {
            ClassPathEntry::Directory(root) => {
                let candidate = root.join(entry);
                if !candidate.is_file() {
                    return Ok(None);
                }
                fs::read(&candidate).map(Some).map_err(|source| ClassLookupError::Io {
                    path: candidate,
                    source,
                })
            }
            ClassPathEntry::Archive(path) => {
                if !path.is_file() {
                    return Ok(None);
                }
                let file = fs::File::open(path).map_err(|source| ClassLookupError::Io {
                    path: path.clone(),
                    source,
                })?;
                read_zip_entry(file, path, entry)
            }
            ClassPathEntry::Jmod(path) => {
                if !path.is_file() {
                    return Ok(None);
                }
                let bytes = fs::read(path).map_err(|source| ClassLookupError::Io {
                    path: path.clone(),
                    source,
                })?;
                if bytes.len() < 4 || bytes[..2] != JMOD_MAGIC {
                    return Err(ClassLookupError::NotAJmod { path: path.clone() });
                }
                read_zip_entry(Cursor::new(&bytes[4..]), path, &format!("{}{}", JMOD_CLASSES, entry))
            }
        }
    }
}

fn read_zip_entry<R: Read + Seek>(reader: R, path: &Path, entry: &str) -> Result<Option<Vec<u8>>, ClassLookupError> {
    let mut archive = ZipArchive::new(reader).map_err(|source| ClassLookupError::Archive {
        path: path.to_owned(),
        source,
    })?;
    let result = match archive.by_name(entry) {
        Ok(mut file) => {
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes).map_err(|source| ClassLookupError::Io {
                path: path.to_owned(),
                source,
            })?;
            Ok(Some(bytes))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(source) => Err(ClassLookupError::Archive {
            path: path.to_owned(),
            source,
        }),
    };
    result
}

///`/usr/lib/jvm/x/bin/java` -> `/usr/lib/jvm/x`, following symlinks.
fn java_home_from_path() -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    let java = env::split_paths(&path)
        .map(|dir| dir.join("java"))
        .find(|p| p.is_file())?;
    let java = fs::canonicalize(java).ok()?;
    java.parent()?.parent().map(Path::to_owned)
}

///Where the JDK classes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JdkRuntime {
    Unset,
    ///`JAVA_HOME` points at a directory without `jmods/java.base.jmod` or `rt.jar`.
    Missing(PathBuf),
    Found(ClassPathEntry),
}

impl JdkRuntime {
    ///Looks for the class archive of the JDK installed at `java_home`.
    pub fn locate(java_home: &Path) -> JdkRuntime {
        let jmod = java_home.join("jmods").join("java.base.jmod");
        let candidates = [
            jmod.clone(),
            java_home.join("jre").join("lib").join("rt.jar"),
            java_home.join("lib").join("rt.jar"),
        ];
        match candidates.iter().find(|p| p.is_file()) {
            Some(found) => JdkRuntime::Found(ClassPathEntry::from_path(found.clone())),
            None => JdkRuntime::Missing(jmod),
        }
    }
}

impl fmt::Display for JdkRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JdkRuntime::Unset => write!(f, "no JDK searched: JAVA_HOME is not set and java is not on PATH"),
            JdkRuntime::Missing(jmod) => write!(f, "no JDK classes: {:?} does not exist", jmod),
            JdkRuntime::Found(entry) => write!(f, "also searched {:?}", entry.path()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassPath {
    entries: Vec<ClassPathEntry>,
    runtime: JdkRuntime,
}

impl ClassPath {
    ///Entries in search order. No JDK classes are searched until a runtime is added.
    pub fn new(roots: Vec<PathBuf>) -> ClassPath {
        ClassPath {
            entries: roots.into_iter().map(ClassPathEntry::from_path).collect(),
            runtime: JdkRuntime::Unset,
        }
    }

    ///Entries from `CLASSPATH` (or the current directory when it is unset or empty) followed by
    ///the JDK at `JAVA_HOME`.
    pub fn from_env() -> ClassPath {
        let roots: Vec<PathBuf> = match env::var_os("CLASSPATH") {
            Some(value) => env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
            None => Vec::new(),
        };
        let roots = if roots.is_empty() { vec![PathBuf::from(".")] } else { roots };
        ClassPath::new(roots).with_system_runtime()
    }

    ///Searches the JDK at `JAVA_HOME`, or the one owning the `java` on `PATH`, after every other
    ///entry.
    pub fn with_system_runtime(self) -> ClassPath {
        let home = env::var_os("JAVA_HOME")
            .filter(|h| !h.is_empty())
            .map(PathBuf::from)
            .or_else(java_home_from_path);
        match home {
            Some(home) => self.with_java_home(&home),
            None => {
                log::debug!("no JDK found");
                self
            }
        }
    }

    pub fn with_java_home(mut self, java_home: &Path) -> ClassPath {
        self.runtime = JdkRuntime::locate(java_home);
        log::debug!("JDK classes: {:?}", self.runtime);
        self
    }

    ///`java.lang.Runnable` -> `java/lang/Runnable.class`
    pub fn entry_name(name: &str) -> String {
        format!("{}.class", name.replace('.', "/"))
    }

    ///Reads the bytes of `name` from the first entry that has it.
    pub fn find(&self, name: &str) -> Result<Vec<u8>, ClassLookupError> {
        let entry = ClassPath::entry_name(name);
        let runtime = match &self.runtime {
            JdkRuntime::Found(e) => Some(e),
            _ => None,
        };
        for candidate in self.entries.iter().chain(runtime) {
            match candidate.read(&entry)? {
                Some(bytes) => {
                    log::debug!("loading {} from {:?}", name, candidate.path());
                    return Ok(bytes);
                }
                None => log::trace!("{} is not in {:?}", entry, candidate.path()),
            }
        }
        Err(ClassLookupError::NotFound {
            name: name.to_owned(),
            searched: self.entries.iter().map(|e| e.path().to_owned()).collect(),
            runtime: self.runtime.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn qualified_names_map_to_entry_names() {
        assert_eq!(ClassPath::entry_name("java.lang.Runnable"), "java/lang/Runnable.class");
        assert_eq!(ClassPath::entry_name("Main"), "Main.class");
    }

    #[test]
    fn entry_kind_follows_extension() {
        assert_eq!(ClassPathEntry::from_path("lib/a.jar".into()), ClassPathEntry::Archive("lib/a.jar".into()));
        assert_eq!(ClassPathEntry::from_path("lib/a.ZIP".into()), ClassPathEntry::Archive("lib/a.ZIP".into()));
        assert_eq!(ClassPathEntry::from_path("java.base.jmod".into()), ClassPathEntry::Jmod("java.base.jmod".into()));
        assert_eq!(ClassPathEntry::from_path("classes".into()), ClassPathEntry::Directory("classes".into()));
    }

    #[test]
    fn first_root_with_the_class_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        for (dir, content) in &[(&first, b"one"), (&second, b"two")] {
            fs::create_dir_all(dir.path().join("a/b")).unwrap();
            fs::write(dir.path().join("a/b/C.class"), content).unwrap();
        }
        let cp = ClassPath::new(vec![first.path().to_owned(), second.path().to_owned()]);
        assert_eq!(cp.find("a.b.C").unwrap(), b"one".to_vec());
        let cp = ClassPath::new(vec![PathBuf::from("/nonexistent"), second.path().to_owned()]);
        assert_eq!(cp.find("a.b.C").unwrap(), b"two".to_vec());
    }

    #[test]
    fn classes_are_read_from_jars() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("lib.jar");
        fs::write(&jar, zip_bytes(&[("META-INF/MANIFEST.MF", &b"Manifest-Version: 1.0\n"[..]),
                                    ("a/b/C.class", &b"jarred"[..])])).unwrap();
        let cp = ClassPath::new(vec![dir.path().join("missing.jar"), jar.clone()]);
        assert_eq!(cp.find("a.b.C").unwrap(), b"jarred".to_vec());
        match cp.find("a.b.D") {
            Err(ClassLookupError::NotFound { searched, .. }) => {
                assert_eq!(searched, vec![dir.path().join("missing.jar"), jar]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn corrupt_jar_is_reported() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join("broken.jar");
        fs::write(&jar, b"not a zip file").unwrap();
        match ClassPath::new(vec![jar.clone()]).find("a.b.C") {
            Err(ClassLookupError::Archive { path, .. }) => assert_eq!(path, jar),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn jdk_classes_come_from_java_base_jmod() {
        let home = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join("jmods")).unwrap();
        let mut jmod = vec![0x4A, 0x4D, 0x01, 0x00];
        jmod.extend(zip_bytes(&[("classes/java/lang/Runnable.class", &b"runnable"[..])]));
        fs::write(home.path().join("jmods/java.base.jmod"), jmod).unwrap();

        let empty = TempDir::new().unwrap();
        let cp = ClassPath::new(vec![empty.path().to_owned()]).with_java_home(home.path());
        assert_eq!(cp.find("java.lang.Runnable").unwrap(), b"runnable".to_vec());
    }

    #[test]
    fn legacy_rt_jar_is_used_without_jmods() {
        let home = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join("jre/lib")).unwrap();
        fs::write(home.path().join("jre/lib/rt.jar"), zip_bytes(&[("java/lang/Runnable.class", &b"rt"[..])])).unwrap();
        assert_eq!(JdkRuntime::locate(home.path()),
                   JdkRuntime::Found(ClassPathEntry::Archive(home.path().join("jre/lib/rt.jar"))));
        let cp = ClassPath::new(Vec::new()).with_java_home(home.path());
        assert_eq!(cp.find("java.lang.Runnable").unwrap(), b"rt".to_vec());
    }

    #[test]
    fn missing_class_names_the_jdk_that_was_searched() {
        let dir = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let cp = ClassPath::new(vec![dir.path().to_owned()]);
        match cp.find("java.lang.Runnable") {
            Err(e @ ClassLookupError::NotFound { .. }) => {
                assert!(e.to_string().contains("JAVA_HOME is not set"), "{}", e);
                if let ClassLookupError::NotFound { name, searched, .. } = e {
                    assert_eq!(name, "java.lang.Runnable");
                    assert_eq!(searched, vec![dir.path().to_owned()]);
                }
            }
            other => panic!("unexpected {:?}", other),
        }
        let cp = cp.with_java_home(home.path());
        let message = cp.find("java.lang.Runnable").unwrap_err().to_string();
        assert!(message.contains("java.base.jmod"), "{}", message);
    }

    #[test]
    fn jmod_without_header_is_rejected() {
        let home = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join("jmods")).unwrap();
        fs::write(home.path().join("jmods/java.base.jmod"), zip_bytes(&[("classes/A.class", &b"a"[..])])).unwrap();
        let cp = ClassPath::new(Vec::new()).with_java_home(home.path());
        match cp.find("A") {
            Err(ClassLookupError::NotAJmod { path }) => assert_eq!(path, home.path().join("jmods/java.base.jmod")),
            other => panic!("unexpected {:?}", other),
        }
    }
}

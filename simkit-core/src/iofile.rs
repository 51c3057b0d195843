//! File-backed data slots exchanged with external simulators.
//!
//! An [`IoFile`] is built standalone and then handed to an entity with
//! [`Core::add_iofile`](crate::Core::add_iofile), which binds it to the
//! entity's simulation directory and stores it in the entity's registry.
//! The backing file path is computed on first access and stays fixed for the
//! lifetime of the `IoFile`.
//!
//! # File format
//!
//! Tab separated text, one row per sample or event, with an optional header
//! line. Complex valued columns always occupy two adjacent columns holding
//! the real and imaginary parts.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::io::Io;
use crate::logger::{self, Level, Logger};
use crate::util;
use crate::var::{Column, Complex, Matrix, Var};
use crate::{Float, Int};

/// Kind name used in log lines emitted by io files.
const IOFILE_KIND: &str = "IoFile";
/// Length of the random part of generated file names.
const RANDOM_PART_LEN: usize = 8;
const DEFAULT_SETTLE_TIME: Duration = Duration::from_secs(10);

/// Direction of the file as seen from the external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Written by us, read by the simulator
    In,
    /// Written by the simulator, read by us
    Out,
}

/// Record layout of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoType {
    /// Each row is a sample at a known sampling instant
    Sample,
    /// Each row is an event, time of the event in column 0
    Event,
}

/// Element type of the data, controls reading and writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// Unsigned integers
    Int,
    /// Signed integers
    SInt,
    /// Unsigned complex values, one column pair per value
    Complex,
    /// Signed complex values, one column pair per value
    SComplex,
    Float,
    /// Written as is, read back with per-column type inference
    Object,
}

impl DataType {
    /// Values of these types are written as integers.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::SInt | DataType::Complex | DataType::SComplex
        )
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, DataType::Complex | DataType::SComplex)
    }
}

impl FromStr for DataType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let dt = match s {
            "int" => DataType::Int,
            "sint" => DataType::SInt,
            "complex" => DataType::Complex,
            "scomplex" => DataType::SComplex,
            "float" => DataType::Float,
            "object" => DataType::Object,
            _ => return Err(Error::ParsingError(format!("unknown datatype: {}", s))),
        };
        Ok(dt)
    }
}

/// Parent entity context captured when an io file gets registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Simulation directory of the parent entity
    pub simpath: PathBuf,
    /// Root path of the parent entity, hidden in log messages
    pub root: PathBuf,
    /// Inherited `preserve_iofiles` flag of the parent
    pub preserve: bool,
    pub debug: bool,
    pub print_colors: bool,
    pub print_relative_path: bool,
}

/// Data slot backed by a text file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoFile {
    name: String,
    io: Io,
    rndpart: String,
    dir: Direction,
    iotype: IoType,
    datatype: DataType,
    ionames: Vec<String>,
    has_header: bool,
    preserve: bool,
    settle_time: Duration,
    binding: Option<Binding>,
    file: Option<PathBuf>,

    #[serde(skip)]
    logger: Logger,
}

impl IoFile {
    /// Creates a new unbound io file with default settings: output
    /// direction, sample layout, integer data, no header.
    pub fn new<S: Into<String>>(name: S) -> Self {
        IoFile {
            name: name.into(),
            io: Io::new(),
            rndpart: util::random_tag(RANDOM_PART_LEN),
            dir: Direction::Out,
            iotype: IoType::Sample,
            datatype: DataType::Int,
            ionames: Vec::new(),
            has_header: false,
            preserve: false,
            settle_time: DEFAULT_SETTLE_TIME,
            binding: None,
            file: None,
            logger: Logger::default(),
        }
    }

    pub fn with_dir(mut self, dir: Direction) -> Self {
        self.dir = dir;
        self
    }

    pub fn with_iotype(mut self, iotype: IoType) -> Self {
        self.iotype = iotype;
        self
    }

    pub fn with_datatype(mut self, datatype: DataType) -> Self {
        self.datatype = datatype;
        self
    }

    pub fn with_ionames(mut self, ionames: Vec<String>) -> Self {
        self.ionames = ionames;
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_preserve(mut self, preserve: bool) -> Self {
        self.preserve = preserve;
        self
    }

    pub fn with_settle_time(mut self, settle_time: Duration) -> Self {
        self.settle_time = settle_time;
        self
    }

    /// Relocates the file to a new parent entity.
    ///
    /// Only affects where the file will be written if its path hasn't been
    /// accessed yet.
    pub fn adopt(self, parent: &mut crate::Core) -> Result<()> {
        parent.add_iofile(self)
    }

    pub(crate) fn bind(&mut self, binding: Binding, logger: Logger) {
        self.binding = Some(binding);
        self.logger = logger;
    }

    pub(crate) fn set_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }
}

/// Accessors.
impl IoFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn io(&self) -> &Io {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut Io {
        &mut self.io
    }

    pub fn data(&self) -> &Var {
        self.io.data()
    }

    pub fn set_data<V: Into<Var>>(&mut self, data: V) {
        self.io.set_data(data)
    }

    pub fn dir(&self) -> Direction {
        self.dir
    }

    pub fn set_dir(&mut self, dir: Direction) {
        self.dir = dir;
    }

    pub fn iotype(&self) -> IoType {
        self.iotype
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    pub fn set_datatype(&mut self, datatype: DataType) {
        self.datatype = datatype;
    }

    pub fn ionames(&self) -> &[String] {
        &self.ionames
    }

    pub fn has_header(&self) -> bool {
        self.has_header
    }

    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// True if the file is kept after use, either by its own flag or by the
    /// parent's `preserve_iofiles`.
    pub fn is_preserved(&self) -> bool {
        self.preserve || self.binding.as_ref().map(|b| b.preserve).unwrap_or(false)
    }

    pub fn set_preserve(&mut self, preserve: bool) {
        self.preserve = preserve;
    }

    /// Path of the backing file, computed and cached on first access.
    pub fn file(&mut self) -> Result<PathBuf> {
        if let Some(file) = &self.file {
            return Ok(file.clone());
        }
        let simpath = match &self.binding {
            Some(b) => b.simpath.clone(),
            None => {
                return Err(self.fatal(&format!(
                    "Parent of io file {} not given, can't resolve file path",
                    self.name
                )))
            }
        };
        let file = simpath.join(format!("{}_{}.txt", self.name, self.rndpart));
        self.file = Some(file.clone());
        Ok(file)
    }

    /// Overrides the backing file path.
    pub fn set_file<P: Into<PathBuf>>(&mut self, file: P) {
        self.file = Some(file.into());
    }

    /// Cached file path, `None` if it was never accessed.
    pub fn cached_file(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}

/// File operations.
impl IoFile {
    /// Writes the slot's current matrix payload using the configured layout.
    pub fn write(&mut self) -> Result<()> {
        let data = match self.io.data() {
            Var::Matrix(m) => m.clone(),
            other => {
                return Err(self.fatal(&format!(
                    "Io file {} can only write matrix data, got {}",
                    self.name,
                    other.get_type()
                )))
            }
        };
        let iotype = self.iotype;
        self.write_data(&data, iotype)
    }

    /// Writes the given data to the file.
    ///
    /// Sets the direction to `In`, only files fed to the external tool are
    /// written here.
    pub fn write_data(&mut self, data: &Matrix, iotype: IoType) -> Result<()> {
        self.dir = Direction::In;
        let integer = self.datatype.is_integer();

        let mut header: Vec<String> = Vec::new();
        let mut parsed: Vec<Vec<String>> = Vec::new();
        for (n, col) in data.columns().iter().enumerate() {
            if n == 0 && iotype == IoType::Event {
                if col.is_complex() {
                    return Err(self.fatal("Timestamp can not be complex."));
                }
                header.push("Timestamp".to_string());
                parsed.extend(format_column(col, integer));
                continue;
            }
            if col.is_complex() {
                header.push(format!("{}_{}_Real", self.name, n));
                header.push(format!("{}_{}_Imag", self.name, n));
            } else {
                header.push(format!("{}_{}", self.name, n));
            }
            parsed.extend(format_column(col, integer));
        }

        let mut content = String::new();
        if self.has_header {
            content.push_str(&header.join("\t"));
            content.push('\n');
        }
        for row in 0..data.rows() {
            let line: Vec<&str> = parsed.iter().map(|c| c[row].as_str()).collect();
            content.push_str(&line.join("\t"));
            content.push('\n');
        }

        let file = self.file()?;
        fs::write(&file, content)?;
        self.log(Level::Debug, &format!("Wrote {}", file.display()));

        // compensate for filesystem propagation delays
        if self.settle_time > Duration::from_secs(0) {
            thread::sleep(self.settle_time);
        }
        Ok(())
    }

    /// Reads the file into the slot's payload.
    ///
    /// `datatype` overrides the configured datatype when given. Complex
    /// datatypes merge adjacent column pairs into complex columns, the first
    /// of the pair being the real part.
    pub fn read(&mut self, datatype: Option<DataType>) -> Result<()> {
        if let Some(dt) = datatype {
            self.datatype = dt;
        }
        let file = self.file()?;
        let content = fs::read_to_string(&file)?;

        let mut raw: Vec<Vec<String>> = Vec::new();
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        if self.has_header {
            lines.next();
        }
        for line in lines {
            let fields: Vec<&str> = line.split('\t').collect();
            if raw.is_empty() {
                raw = vec![Vec::new(); fields.len()];
            }
            if fields.len() != raw.len() {
                return Err(Error::ParsingError(format!(
                    "inconsistent column count in {}: expected {}, got {}",
                    file.display(),
                    raw.len(),
                    fields.len()
                )));
            }
            for (n, field) in fields.iter().enumerate() {
                raw[n].push(field.trim().to_string());
            }
        }

        let columns = match self.datatype {
            DataType::Complex | DataType::SComplex => {
                self.log(Level::Info, "Reading complex");
                if raw.len() % 2 != 0 {
                    return Err(Error::ParsingError(format!(
                        "complex data in {} needs an even number of columns, got {}",
                        file.display(),
                        raw.len()
                    )));
                }
                let mut columns = Vec::with_capacity(raw.len() / 2);
                for pair in raw.chunks(2) {
                    let mut values = Vec::with_capacity(pair[0].len());
                    for (re, im) in pair[0].iter().zip(pair[1].iter()) {
                        values.push(Complex::new(re.parse()?, im.parse()?));
                    }
                    columns.push(Column::Complex(values));
                }
                columns
            }
            DataType::Int | DataType::SInt => raw
                .iter()
                .map(|c| Ok(Column::Int(parse_all::<Int>(c)?)))
                .collect::<Result<Vec<Column>>>()?,
            DataType::Float => raw
                .iter()
                .map(|c| Ok(Column::Float(parse_all::<Float>(c)?)))
                .collect::<Result<Vec<Column>>>()?,
            DataType::Object => raw.into_iter().map(infer_column).collect(),
        };

        self.io.set_data(Matrix::new(columns)?);
        Ok(())
    }

    /// Removes the backing file unless it's preserved.
    ///
    /// Failing to remove is not an error, the file may already be gone.
    pub fn remove(&mut self) {
        if self.is_preserved() {
            let msg = match &self.file {
                Some(f) => format!("Preserving file {}", f.display()),
                None => format!("Preserving file of {}", self.name),
            };
            self.log(Level::Info, &msg);
            return;
        }
        if let Some(file) = &self.file {
            if let Err(e) = fs::remove_file(file) {
                debug!("failed removing {}: {}", file.display(), e);
            }
        }
    }
}

/// Logging.
impl IoFile {
    fn log(&self, level: Level, msg: &str) {
        let (debug, colors, relative) = match &self.binding {
            Some(b) => (b.debug, b.print_colors, b.print_relative_path),
            None => (false, true, false),
        };
        if level == Level::Debug && !debug {
            return;
        }
        let msg = match (&self.binding, relative) {
            (Some(b), true) => logger::relativize(msg, &[b.root.as_path()]),
            _ => msg.to_string(),
        };
        self.logger.emit(level, IOFILE_KIND, &msg, colors);
    }

    fn fatal(&self, msg: &str) -> Error {
        self.log(Level::Fatal, msg);
        Error::Fatal {
            kind: IOFILE_KIND.to_string(),
            msg: msg.to_string(),
        }
    }
}

impl fmt::Display for IoFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Formats a column into one output column, or two for complex values.
fn format_column(col: &Column, integer: bool) -> Vec<Vec<String>> {
    let float = |v: Float| {
        if integer {
            (v.trunc() as Int).to_string()
        } else {
            v.to_string()
        }
    };
    match col {
        Column::Int(v) => vec![v.iter().map(|x| x.to_string()).collect()],
        Column::Float(v) => vec![v.iter().map(|x| float(*x)).collect()],
        Column::Complex(v) => vec![
            v.iter().map(|x| float(x.re)).collect(),
            v.iter().map(|x| float(x.im)).collect(),
        ],
        Column::Str(v) => vec![v.clone()],
    }
}

fn parse_all<T>(col: &[String]) -> Result<Vec<T>>
where
    T: FromStr,
    Error: From<T::Err>,
{
    let mut out = Vec::with_capacity(col.len());
    for s in col {
        out.push(s.parse::<T>()?);
    }
    Ok(out)
}

/// Picks the narrowest column type that can hold all the values.
fn infer_column(col: Vec<String>) -> Column {
    if let Ok(ints) = col
        .iter()
        .map(|s| s.parse::<Int>())
        .collect::<std::result::Result<Vec<Int>, _>>()
    {
        return Column::Int(ints);
    }
    if let Ok(floats) = col
        .iter()
        .map(|s| s.parse::<Float>())
        .collect::<std::result::Result<Vec<Float>, _>>()
    {
        return Column::Float(floats);
    }
    Column::Str(col)
}

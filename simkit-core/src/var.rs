//! Variable types and their transformations.
//!
//! `Var` is the dynamic value carried by data slots, parallel run results
//! and declared entity properties. Numeric array payloads are represented
//! with the column-oriented [`Matrix`].

use std::fmt;

use crate::error::{Error, Result};
use crate::{Float, Int};

const NONE_VAR_TYPE_NAME: &str = "none";
const STR_VAR_TYPE_NAME: &str = "str";
const INT_VAR_TYPE_NAME: &str = "int";
const FLOAT_VAR_TYPE_NAME: &str = "float";
const BOOL_VAR_TYPE_NAME: &str = "bool";
const COMPLEX_VAR_TYPE_NAME: &str = "complex";
const STR_LIST_VAR_TYPE_NAME: &str = "str_list";
const INT_LIST_VAR_TYPE_NAME: &str = "int_list";
const FLOAT_LIST_VAR_TYPE_NAME: &str = "float_list";
const BOOL_LIST_VAR_TYPE_NAME: &str = "bool_list";
const MATRIX_VAR_TYPE_NAME: &str = "matrix";

/// Defines all possible types of values.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum VarType {
    None,
    Str,
    Int,
    Float,
    Bool,
    Complex,
    StrList,
    IntList,
    FloatList,
    BoolList,
    Matrix,
}

impl VarType {
    /// Returns string literal name of the `VarType`.
    pub fn to_str(&self) -> &'static str {
        match self {
            VarType::None => NONE_VAR_TYPE_NAME,
            VarType::Str => STR_VAR_TYPE_NAME,
            VarType::Int => INT_VAR_TYPE_NAME,
            VarType::Float => FLOAT_VAR_TYPE_NAME,
            VarType::Bool => BOOL_VAR_TYPE_NAME,
            VarType::Complex => COMPLEX_VAR_TYPE_NAME,
            VarType::StrList => STR_LIST_VAR_TYPE_NAME,
            VarType::IntList => INT_LIST_VAR_TYPE_NAME,
            VarType::FloatList => FLOAT_LIST_VAR_TYPE_NAME,
            VarType::BoolList => BOOL_LIST_VAR_TYPE_NAME,
            VarType::Matrix => MATRIX_VAR_TYPE_NAME,
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// Complex number with floating point parts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Complex {
    pub re: Float,
    pub im: Float,
}

impl Complex {
    pub fn new(re: Float, im: Float) -> Self {
        Complex { re, im }
    }
}

impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.im < 0.0 {
            write!(f, "{}-{}j", self.re, -self.im)
        } else {
            write!(f, "{}+{}j", self.re, self.im)
        }
    }
}

/// Single typed column of a [`Matrix`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Int(Vec<Int>),
    Float(Vec<Float>),
    Complex(Vec<Complex>),
    Str(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Complex(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Column::Complex(_))
    }
}

/// Two-dimensional data stored as equally long typed columns.
///
/// Each column keeps its own element type, so a matrix can mix e.g. an
/// integer timestamp column with complex valued sample columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Matrix {
    columns: Vec<Column>,
}

impl Matrix {
    /// Creates a new matrix, checking that all columns have equal length.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let expected = first.len();
            for col in &columns {
                if col.len() != expected {
                    return Err(Error::ColumnLengthMismatch {
                        expected,
                        got: col.len(),
                    });
                }
            }
        }
        Ok(Matrix { columns })
    }

    /// Creates an integer matrix from row-major data.
    pub fn from_int_rows(rows: &[Vec<Int>]) -> Result<Self> {
        let ncols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut columns = vec![Vec::with_capacity(rows.len()); ncols];
        for row in rows {
            if row.len() != ncols {
                return Err(Error::ColumnLengthMismatch {
                    expected: ncols,
                    got: row.len(),
                });
            }
            for (n, val) in row.iter().enumerate() {
                columns[n].push(*val);
            }
        }
        Matrix::new(columns.into_iter().map(Column::Int).collect())
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, n: usize) -> Option<&Column> {
        self.columns.get(n)
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

/// Abstraction over all available variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Var {
    None,
    Str(String),
    Int(Int),
    Float(Float),
    Bool(bool),
    Complex(Complex),
    StrList(Vec<String>),
    IntList(Vec<Int>),
    FloatList(Vec<Float>),
    BoolList(Vec<bool>),
    Matrix(Matrix),
}

impl Default for Var {
    fn default() -> Self {
        Var::None
    }
}

impl Var {
    pub fn get_type(&self) -> VarType {
        match self {
            Var::None => VarType::None,
            Var::Str(_) => VarType::Str,
            Var::Int(_) => VarType::Int,
            Var::Float(_) => VarType::Float,
            Var::Bool(_) => VarType::Bool,
            Var::Complex(_) => VarType::Complex,
            Var::StrList(_) => VarType::StrList,
            Var::IntList(_) => VarType::IntList,
            Var::FloatList(_) => VarType::FloatList,
            Var::BoolList(_) => VarType::BoolList,
            Var::Matrix(_) => VarType::Matrix,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Var::None)
    }

    fn type_error(&self, expected: VarType) -> Error {
        Error::InvalidVarType {
            expected: expected.to_string(),
            got: self.get_type().to_string(),
        }
    }
}

/// Type-strict `as_type` getters.
impl Var {
    pub fn as_str(&self) -> Result<&String> {
        match self {
            Var::Str(v) => Ok(v),
            _ => Err(self.type_error(VarType::Str)),
        }
    }
    pub fn as_int(&self) -> Result<Int> {
        match self {
            Var::Int(v) => Ok(*v),
            _ => Err(self.type_error(VarType::Int)),
        }
    }
    /// Integers are widened to floats.
    pub fn as_float(&self) -> Result<Float> {
        match self {
            Var::Float(v) => Ok(*v),
            Var::Int(v) => Ok(*v as Float),
            _ => Err(self.type_error(VarType::Float)),
        }
    }
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Var::Bool(v) => Ok(*v),
            _ => Err(self.type_error(VarType::Bool)),
        }
    }
    pub fn as_complex(&self) -> Result<Complex> {
        match self {
            Var::Complex(v) => Ok(*v),
            _ => Err(self.type_error(VarType::Complex)),
        }
    }
    pub fn as_str_list(&self) -> Result<&Vec<String>> {
        match self {
            Var::StrList(v) => Ok(v),
            _ => Err(self.type_error(VarType::StrList)),
        }
    }
    pub fn as_int_list(&self) -> Result<&Vec<Int>> {
        match self {
            Var::IntList(v) => Ok(v),
            _ => Err(self.type_error(VarType::IntList)),
        }
    }
    pub fn as_float_list(&self) -> Result<&Vec<Float>> {
        match self {
            Var::FloatList(v) => Ok(v),
            _ => Err(self.type_error(VarType::FloatList)),
        }
    }
    pub fn as_matrix(&self) -> Result<&Matrix> {
        match self {
            Var::Matrix(v) => Ok(v),
            _ => Err(self.type_error(VarType::Matrix)),
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Var::None => write!(f, "None"),
            Var::Str(v) => write!(f, "{}", v),
            Var::Int(v) => write!(f, "{}", v),
            Var::Float(v) => write!(f, "{}", v),
            Var::Bool(v) => write!(f, "{}", v),
            Var::Complex(v) => write!(f, "{}", v),
            Var::StrList(v) => write!(f, "{:?}", v),
            Var::IntList(v) => write!(f, "{:?}", v),
            Var::FloatList(v) => write!(f, "{:?}", v),
            Var::BoolList(v) => write!(f, "{:?}", v),
            Var::Matrix(m) => write!(f, "<{}x{} matrix>", m.rows(), m.cols()),
        }
    }
}

impl From<String> for Var {
    fn from(v: String) -> Self {
        Var::Str(v)
    }
}
impl From<&str> for Var {
    fn from(v: &str) -> Self {
        Var::Str(v.to_string())
    }
}
impl From<Int> for Var {
    fn from(v: Int) -> Self {
        Var::Int(v)
    }
}
impl From<Float> for Var {
    fn from(v: Float) -> Self {
        Var::Float(v)
    }
}
impl From<bool> for Var {
    fn from(v: bool) -> Self {
        Var::Bool(v)
    }
}
impl From<Complex> for Var {
    fn from(v: Complex) -> Self {
        Var::Complex(v)
    }
}
impl From<Vec<String>> for Var {
    fn from(v: Vec<String>) -> Self {
        Var::StrList(v)
    }
}
impl From<Vec<Int>> for Var {
    fn from(v: Vec<Int>) -> Self {
        Var::IntList(v)
    }
}
impl From<Vec<Float>> for Var {
    fn from(v: Vec<Float>) -> Self {
        Var::FloatList(v)
    }
}
impl From<Matrix> for Var {
    fn from(v: Matrix) -> Self {
        Var::Matrix(v)
    }
}

mod parse;
pub mod tokenize;

use std::collections::{HashMap, VecDeque};
use std::fs;

use thiserror::Error;
use tracing::debug;

use lang_component::memory::{InvalidAddress, Memory};

use crate::tokenize::{tokenize_line, Token};

pub const SOURCE_SUFFIX: &str = ".clsh";

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Error: {message}\nLine No: {line_no}\nSource: {source_name}\nToken: {token}")]
    Parse {
        message: String,
        token: String,
        source_name: String,
        line_no: usize,
    },
    #[error("Error: could not tokenize line.\nLine No: {line_no}\nSource: {source_name}")]
    Tokenize { source_name: String, line_no: usize },
    #[error("Invalid import statement.\nLine No: {line_no}\nSource: {source_name}")]
    InvalidImport { source_name: String, line_no: usize },
    #[error("Could not read source file {name}.clsh.")]
    UnreadableSource {
        name: String,
        #[source]
        cause: std::io::Error,
    },
    #[error("Could not find placeholder {0}.")]
    UnresolvedPlaceholder(String),
    #[error("No more tokens to parse!")]
    OutOfTokens,
    #[error(transparent)]
    Memory(#[from] InvalidAddress),
}

/// Compiles source into memory: tokenize (inlining imports), predefine the
/// built-in symbols, parse statements into blocks, then resolve forward
/// references.
pub struct Compiler<'a> {
    memory: &'a mut Memory,
    tokens: VecDeque<Token>,
    symtab: HashMap<String, i64>,
    pointer: i64,
}

/// Compiles `<program>.clsh` from disk, recursing into imports.
pub fn compile_file(program: &str, memory: &mut Memory) -> Result<(), CompileError> {
    let mut compiler = Compiler::new(memory);
    compiler.read_file_tokens(program)?;
    compiler.compile()
}

/// Compiles in-memory source text. Imports still resolve against the
/// filesystem.
pub fn compile_source(name: &str, text: &str, memory: &mut Memory) -> Result<(), CompileError> {
    let mut compiler = Compiler::new(memory);
    compiler.read_source_tokens(name, text)?;
    compiler.compile()
}

impl<'a> Compiler<'a> {
    fn new(memory: &'a mut Memory) -> Self {
        Compiler {
            memory,
            tokens: VecDeque::new(),
            symtab: HashMap::new(),
            pointer: 0,
        }
    }

    fn compile(&mut self) -> Result<(), CompileError> {
        self.preprocess();
        self.parse_statements()?;
        self.replace_placeholders()?;
        debug!(blocks = self.pointer, symbols = self.symtab.len(), "compiled");
        Ok(())
    }

    fn read_file_tokens(&mut self, name: &str) -> Result<(), CompileError> {
        let text =
            fs::read_to_string(format!("{}{}", name, SOURCE_SUFFIX)).map_err(|cause| {
                CompileError::UnreadableSource {
                    name: name.to_string(),
                    cause,
                }
            })?;
        self.read_source_tokens(name, &text)
    }

    fn read_source_tokens(&mut self, name: &str, text: &str) -> Result<(), CompileError> {
        for (line_no, line) in text.lines().enumerate() {
            let words = match tokenize_line(line) {
                Ok((_, words)) => words,
                Err(_) => {
                    return Err(CompileError::Tokenize {
                        source_name: name.to_string(),
                        line_no,
                    })
                }
            };

            if line.contains("import") {
                // An import line is exactly `import <name>`; the named
                // file's tokens are inlined here.
                match words.as_slice() {
                    [keyword, import] if keyword == "import" => {
                        self.read_file_tokens(import)?;
                    }
                    _ => {
                        return Err(CompileError::InvalidImport {
                            source_name: name.to_string(),
                            line_no,
                        })
                    }
                }
            } else {
                for word in words {
                    self.tokens.push_back(Token::new(&word, name, line_no));
                }
            }
        }
        Ok(())
    }
}

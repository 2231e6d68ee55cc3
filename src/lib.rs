//! Luacloak: a Lua-subset obfuscation pipeline.
//!
//! Compiles a textual script into a private bytecode form, optionally
//! scrambles that bytecode with a reversible keystream, and executes
//! it on a purpose-built stack VM. The goal is source obfuscation:
//! static inspection of a distributed script gets harder while runtime
//! behavior stays exact.
//!
//! # Pipeline
//!
//! text → tokens → AST → [`Chunk`] → [`encrypt`] → [`serialize`] →
//! artifact → [`deserialize`] → decode → [`run`].
//!
//! The keystream pass is an obfuscation device only; the key ships
//! alongside the ciphertext and the scheme has no cryptographic
//! strength. Command surfaces, cosmetic text rewriting and all I/O
//! live outside this crate.

pub mod ast;
pub mod bytecode;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;

use std::rc::Rc;

pub use bytecode::{Chunk, EncryptedChunk, Environment, Value, Vm};
pub use error::LuacloakError;

/// Compile source text into the chunk for its top-level function body.
pub fn compile(source: &str) -> Result<Chunk, LuacloakError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let block = parser::Parser::new(tokens).parse()?;
    let chunk = bytecode::compile(&block)?;
    Ok(chunk)
}

/// Scramble a compiled chunk with a keystream key. Deterministic for a
/// given key; a missing key is drawn at random from 1-255.
pub fn encrypt(chunk: &Chunk, key: Option<u8>) -> Result<EncryptedChunk, LuacloakError> {
    Ok(bytecode::encode(chunk, key)?)
}

/// Frame an encrypted chunk as a self-contained text artifact. A
/// compatible host recovers the embedded key and ciphertext with
/// [`deserialize`] and runs the decoded chunk against its own globals.
pub fn serialize(encrypted: &EncryptedChunk) -> String {
    bytecode::to_artifact(encrypted)
}

/// Recover the encrypted chunk embedded in an artifact, bit-for-bit.
pub fn deserialize(artifact: &str) -> Result<EncryptedChunk, LuacloakError> {
    Ok(bytecode::from_artifact(artifact)?)
}

/// Decode an encrypted chunk back to its compiled form.
pub fn decrypt(encrypted: &EncryptedChunk) -> Result<Chunk, LuacloakError> {
    Ok(bytecode::decode(encrypted)?)
}

/// Execute a chunk on a fresh VM against the host's environment,
/// yielding its top-level return values.
pub fn run(
    chunk: &Chunk,
    args: Vec<Value>,
    env: &mut Environment,
) -> Result<Vec<Value>, LuacloakError> {
    let mut vm = Vm::new();
    let results = vm.run(Rc::new(chunk.clone()), args, env)?;
    Ok(results)
}

/// Full front half of the pipeline: compile, scramble, frame. This is
/// what the surrounding command layer calls to obfuscate one script.
pub fn obfuscate(source: &str, key: Option<u8>) -> Result<String, LuacloakError> {
    let chunk = compile(source)?;
    let encrypted = encrypt(&chunk, key)?;
    Ok(serialize(&encrypted))
}

/// Full back half of the pipeline: decode an artifact and execute it.
pub fn run_artifact(
    artifact: &str,
    args: Vec<Value>,
    env: &mut Environment,
) -> Result<Vec<Value>, LuacloakError> {
    let encrypted = deserialize(artifact)?;
    let chunk = decrypt(&encrypted)?;
    run(&chunk, args, env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_end_to_end() {
        let artifact = obfuscate(
            "
            local total = 0
            for i = 1, 10 do total = total + i end
            return total
            ",
            Some(99),
        )
        .unwrap();

        let mut env = Environment::with_stdlib();
        let results = run_artifact(&artifact, Vec::new(), &mut env).unwrap();
        assert_eq!(results, vec![Value::Number(55.0)]);
    }

    #[test]
    fn test_obfuscation_hides_source_strings() {
        let artifact = obfuscate("return 'super-secret-token'", None).unwrap();
        assert!(!artifact.contains("super-secret-token"));
    }

    #[test]
    fn test_compile_reports_lex_errors() {
        let err = compile("local s = 'unterminated").unwrap_err();
        assert!(matches!(err, LuacloakError::Lexer(_)));
    }

    #[test]
    fn test_compile_reports_parse_errors() {
        let err = compile("local x = ").unwrap_err();
        assert!(matches!(err, LuacloakError::Parser(_)));
    }

    #[test]
    fn test_compile_reports_compile_errors() {
        let err = compile("break").unwrap_err();
        assert!(matches!(err, LuacloakError::Compile(_)));
    }

    #[test]
    fn test_run_reports_runtime_errors() {
        let chunk = compile("return nil + 1").unwrap();
        let mut env = Environment::new();
        let err = run(&chunk, Vec::new(), &mut env).unwrap_err();
        assert!(matches!(err, LuacloakError::Runtime(_)));
    }

    #[test]
    fn test_rerunning_never_mutates_the_chunk() {
        let chunk = compile("counter = (counter or 0) + 1 return counter").unwrap();
        let snapshot = chunk.clone();

        let mut env = Environment::new();
        run(&chunk, Vec::new(), &mut env).unwrap();
        run(&chunk, Vec::new(), &mut env).unwrap();
        encrypt(&chunk, Some(3)).unwrap();

        assert_eq!(chunk, snapshot);
    }
}

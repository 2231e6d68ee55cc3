//! Chunk encoder: flat byte serialization scrambled with a repeating
//! single-byte keystream, and the text artifact framing around it.
//!
//! The XOR pass is an obfuscation device, not a security boundary: the
//! key travels with the ciphertext, and decode requires it.

use std::rc::Rc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::Rng;

use crate::bytecode::chunk::{Chunk, Constant};
use crate::bytecode::instruction::Instr;
use crate::error::EncodeError;

/// Magic prefix of the artifact byte layout.
const MAGIC: &[u8; 4] = b"LCK1";

/// A keystream-scrambled chunk, independently distributable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedChunk {
    /// The XOR key, 1-255.
    pub key: u8,
    /// The scrambled serialization.
    pub bytes: Vec<u8>,
}

/// Serialize `chunk` and XOR every byte with `key`. A missing key is
/// drawn uniformly from 1-255; key 0 would be a no-op and is rejected.
pub fn encode(chunk: &Chunk, key: Option<u8>) -> Result<EncryptedChunk, EncodeError> {
    let key = match key {
        Some(0) => return Err(EncodeError::ZeroKey),
        Some(k) => k,
        None => rand::thread_rng().gen_range(1..=255),
    };

    let mut writer = Writer::default();
    writer.chunk(chunk);

    let mut bytes = writer.buf;
    for byte in &mut bytes {
        *byte ^= key;
    }

    Ok(EncryptedChunk { key, bytes })
}

/// Exact inverse of [`encode`]: re-XOR, then deserialize in the same
/// order. Corrupt input fails typed; no partial chunk is produced.
pub fn decode(encrypted: &EncryptedChunk) -> Result<Chunk, EncodeError> {
    if encrypted.key == 0 {
        return Err(EncodeError::ZeroKey);
    }

    let plain: Vec<u8> = encrypted.bytes.iter().map(|b| b ^ encrypted.key).collect();
    let mut reader = Reader {
        buf: &plain,
        pos: 0,
    };
    let chunk = reader.chunk()?;
    if reader.pos != plain.len() {
        return Err(EncodeError::Truncated(reader.pos));
    }
    Ok(chunk)
}

/// Frame an encrypted chunk as a standalone text artifact.
pub fn to_artifact(encrypted: &EncryptedChunk) -> String {
    let mut raw = Vec::with_capacity(MAGIC.len() + 1 + encrypted.bytes.len());
    raw.extend_from_slice(MAGIC);
    raw.push(encrypted.key);
    raw.extend_from_slice(&encrypted.bytes);
    BASE64.encode(raw)
}

/// Recover the encrypted chunk embedded in an artifact, bit-for-bit.
pub fn from_artifact(text: &str) -> Result<EncryptedChunk, EncodeError> {
    let raw = BASE64
        .decode(text.trim())
        .map_err(|e| EncodeError::BadArtifact(e.to_string()))?;
    if raw.len() < MAGIC.len() + 1 {
        return Err(EncodeError::BadArtifact("artifact too short".to_string()));
    }
    if &raw[..MAGIC.len()] != MAGIC {
        return Err(EncodeError::BadArtifact("bad magic".to_string()));
    }
    let key = raw[MAGIC.len()];
    if key == 0 {
        return Err(EncodeError::ZeroKey);
    }
    Ok(EncryptedChunk {
        key,
        bytes: raw[MAGIC.len() + 1..].to_vec(),
    })
}

// ===== Serialization =====

// Instruction tags. Gaps are reserved; unknown tags fail decode.
const T_LOADK: u8 = 0x01;
const T_LOADNIL: u8 = 0x02;
const T_LOADBOOL: u8 = 0x03;
const T_GETGLOBAL: u8 = 0x04;
const T_SETGLOBAL: u8 = 0x05;
const T_GETLOCAL: u8 = 0x06;
const T_SETLOCAL: u8 = 0x07;
const T_GETFIELD: u8 = 0x08;
const T_GETINDEX: u8 = 0x09;
const T_SETFIELD: u8 = 0x0A;
const T_SETINDEX: u8 = 0x0B;
const T_NEWTABLE: u8 = 0x0C;
const T_ADD: u8 = 0x0D;
const T_SUB: u8 = 0x0E;
const T_MUL: u8 = 0x0F;
const T_DIV: u8 = 0x10;
const T_IDIV: u8 = 0x11;
const T_MOD: u8 = 0x12;
const T_POW: u8 = 0x13;
const T_UNM: u8 = 0x14;
const T_NOT: u8 = 0x15;
const T_LEN: u8 = 0x16;
const T_CONCAT: u8 = 0x17;
const T_EQ: u8 = 0x18;
const T_LT: u8 = 0x19;
const T_LE: u8 = 0x1A;
const T_JMP: u8 = 0x1B;
const T_JMPIFFALSE: u8 = 0x1C;
const T_CALL: u8 = 0x1D;
const T_SELF: u8 = 0x1E;
const T_RETURN: u8 = 0x1F;
const T_FORPREP: u8 = 0x20;
const T_FORLOOP: u8 = 0x21;
const T_CLOSURE: u8 = 0x22;
const T_VARARG: u8 = 0x23;
const T_POP: u8 = 0x24;
const T_DUP: u8 = 0x25;

// Constant tags.
const C_NUMBER: u8 = 0x00;
const C_STRING: u8 = 0x01;
const C_BOOL: u8 = 0x02;
const C_PROTO: u8 = 0x03;

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn str(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn chunk(&mut self, chunk: &Chunk) {
        self.u8(chunk.num_params);
        self.u8(chunk.is_vararg as u8);
        self.u16(chunk.num_locals);

        self.u32(chunk.code.len() as u32);
        for instr in &chunk.code {
            self.instr(instr);
        }

        self.u16(chunk.constants.len() as u16);
        for constant in &chunk.constants {
            self.constant(constant);
        }

        self.u16(chunk.protos.len() as u16);
        for proto in &chunk.protos {
            self.chunk(proto);
        }
    }

    fn instr(&mut self, instr: &Instr) {
        match *instr {
            Instr::LoadK(idx) => {
                self.u8(T_LOADK);
                self.u16(idx);
            }
            Instr::LoadNil => self.u8(T_LOADNIL),
            Instr::LoadBool(b) => {
                self.u8(T_LOADBOOL);
                self.u8(b as u8);
            }
            Instr::GetGlobal(idx) => {
                self.u8(T_GETGLOBAL);
                self.u16(idx);
            }
            Instr::SetGlobal(idx) => {
                self.u8(T_SETGLOBAL);
                self.u16(idx);
            }
            Instr::GetLocal(slot) => {
                self.u8(T_GETLOCAL);
                self.u16(slot);
            }
            Instr::SetLocal(slot) => {
                self.u8(T_SETLOCAL);
                self.u16(slot);
            }
            Instr::GetField(idx) => {
                self.u8(T_GETFIELD);
                self.u16(idx);
            }
            Instr::GetIndex => self.u8(T_GETINDEX),
            Instr::SetField(idx) => {
                self.u8(T_SETFIELD);
                self.u16(idx);
            }
            Instr::SetIndex => self.u8(T_SETINDEX),
            Instr::NewTable => self.u8(T_NEWTABLE),
            Instr::Add => self.u8(T_ADD),
            Instr::Sub => self.u8(T_SUB),
            Instr::Mul => self.u8(T_MUL),
            Instr::Div => self.u8(T_DIV),
            Instr::IDiv => self.u8(T_IDIV),
            Instr::Mod => self.u8(T_MOD),
            Instr::Pow => self.u8(T_POW),
            Instr::Unm => self.u8(T_UNM),
            Instr::Not => self.u8(T_NOT),
            Instr::Len => self.u8(T_LEN),
            Instr::Concat => self.u8(T_CONCAT),
            Instr::Eq { invert } => {
                self.u8(T_EQ);
                self.u8(invert as u8);
            }
            Instr::Lt { invert } => {
                self.u8(T_LT);
                self.u8(invert as u8);
            }
            Instr::Le { invert } => {
                self.u8(T_LE);
                self.u8(invert as u8);
            }
            Instr::Jmp(target) => {
                self.u8(T_JMP);
                self.u32(target);
            }
            Instr::JmpIfFalse(target) => {
                self.u8(T_JMPIFFALSE);
                self.u32(target);
            }
            Instr::Call { nargs, nret } => {
                self.u8(T_CALL);
                self.u8(nargs);
                self.u8(nret);
            }
            Instr::SelfField(idx) => {
                self.u8(T_SELF);
                self.u16(idx);
            }
            Instr::Return(nret) => {
                self.u8(T_RETURN);
                self.u8(nret);
            }
            Instr::ForPrep { slot, target } => {
                self.u8(T_FORPREP);
                self.u16(slot);
                self.u32(target);
            }
            Instr::ForLoop { slot, target } => {
                self.u8(T_FORLOOP);
                self.u16(slot);
                self.u32(target);
            }
            Instr::Closure(idx) => {
                self.u8(T_CLOSURE);
                self.u16(idx);
            }
            Instr::Vararg => self.u8(T_VARARG),
            Instr::Pop => self.u8(T_POP),
            Instr::Dup => self.u8(T_DUP),
        }
    }

    fn constant(&mut self, constant: &Constant) {
        match constant {
            Constant::Number(n) => {
                self.u8(C_NUMBER);
                self.f64(*n);
            }
            Constant::Str(s) => {
                // Raw text bytes; the XOR pass covers them like
                // everything else
                self.u8(C_STRING);
                self.str(s);
            }
            Constant::Bool(b) => {
                self.u8(C_BOOL);
                self.u8(*b as u8);
            }
            Constant::Proto(idx) => {
                self.u8(C_PROTO);
                self.u16(*idx);
            }
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], EncodeError> {
        if self.pos + n > self.buf.len() {
            return Err(EncodeError::Truncated(self.pos));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, EncodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, EncodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, EncodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn f64(&mut self) -> Result<f64, EncodeError> {
        let bytes = self.take(8)?;
        let mut array = [0u8; 8];
        array.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(array))
    }

    fn str(&mut self) -> Result<String, EncodeError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| EncodeError::Truncated(self.pos))
    }

    fn bool(&mut self) -> Result<bool, EncodeError> {
        Ok(self.u8()? != 0)
    }

    fn chunk(&mut self) -> Result<Chunk, EncodeError> {
        let num_params = self.u8()?;
        let is_vararg = self.bool()?;
        let num_locals = self.u16()?;

        let code_len = self.u32()? as usize;
        let mut code = Vec::with_capacity(code_len.min(1 << 16));
        for _ in 0..code_len {
            code.push(self.instr()?);
        }

        let const_len = self.u16()? as usize;
        let mut constants = Vec::with_capacity(const_len);
        for _ in 0..const_len {
            constants.push(self.constant()?);
        }

        let proto_len = self.u16()? as usize;
        let mut protos = Vec::with_capacity(proto_len);
        for _ in 0..proto_len {
            protos.push(Rc::new(self.chunk()?));
        }

        Ok(Chunk {
            code,
            constants,
            num_locals,
            num_params,
            is_vararg,
            protos,
        })
    }

    fn instr(&mut self) -> Result<Instr, EncodeError> {
        let tag = self.u8()?;
        let instr = match tag {
            T_LOADK => Instr::LoadK(self.u16()?),
            T_LOADNIL => Instr::LoadNil,
            T_LOADBOOL => Instr::LoadBool(self.bool()?),
            T_GETGLOBAL => Instr::GetGlobal(self.u16()?),
            T_SETGLOBAL => Instr::SetGlobal(self.u16()?),
            T_GETLOCAL => Instr::GetLocal(self.u16()?),
            T_SETLOCAL => Instr::SetLocal(self.u16()?),
            T_GETFIELD => Instr::GetField(self.u16()?),
            T_GETINDEX => Instr::GetIndex,
            T_SETFIELD => Instr::SetField(self.u16()?),
            T_SETINDEX => Instr::SetIndex,
            T_NEWTABLE => Instr::NewTable,
            T_ADD => Instr::Add,
            T_SUB => Instr::Sub,
            T_MUL => Instr::Mul,
            T_DIV => Instr::Div,
            T_IDIV => Instr::IDiv,
            T_MOD => Instr::Mod,
            T_POW => Instr::Pow,
            T_UNM => Instr::Unm,
            T_NOT => Instr::Not,
            T_LEN => Instr::Len,
            T_CONCAT => Instr::Concat,
            T_EQ => Instr::Eq {
                invert: self.bool()?,
            },
            T_LT => Instr::Lt {
                invert: self.bool()?,
            },
            T_LE => Instr::Le {
                invert: self.bool()?,
            },
            T_JMP => Instr::Jmp(self.u32()?),
            T_JMPIFFALSE => Instr::JmpIfFalse(self.u32()?),
            T_CALL => Instr::Call {
                nargs: self.u8()?,
                nret: self.u8()?,
            },
            T_SELF => Instr::SelfField(self.u16()?),
            T_RETURN => Instr::Return(self.u8()?),
            T_FORPREP => Instr::ForPrep {
                slot: self.u16()?,
                target: self.u32()?,
            },
            T_FORLOOP => Instr::ForLoop {
                slot: self.u16()?,
                target: self.u32()?,
            },
            T_CLOSURE => Instr::Closure(self.u16()?),
            T_VARARG => Instr::Vararg,
            T_POP => Instr::Pop,
            T_DUP => Instr::Dup,
            other => return Err(EncodeError::BadTag(other)),
        };
        Ok(instr)
    }

    fn constant(&mut self) -> Result<Constant, EncodeError> {
        let tag = self.u8()?;
        let constant = match tag {
            C_NUMBER => Constant::Number(self.f64()?),
            C_STRING => Constant::Str(self.str()?),
            C_BOOL => Constant::Bool(self.bool()?),
            C_PROTO => Constant::Proto(self.u16()?),
            other => return Err(EncodeError::BadTag(other)),
        };
        Ok(constant)
    }
}

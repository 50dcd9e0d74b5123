//! Class-name rewriting inside descriptors and generic signatures.
//!
//! Descriptors are a subset of the signature grammar, so one recursive
//! descent parser handles field descriptors, method descriptors, and class,
//! method and field signatures.

use crate::core::error::{BuildError, BuildResult};

/// Rewrite every class name in `signature` through `map_class`.
pub fn remap_signature<F>(signature: &str, class_file: &str, map_class: &mut F) -> BuildResult<String>
where
    F: FnMut(&str) -> BuildResult<String>,
{
    let mut parser = SignatureRemapper {
        input: signature,
        pos: 0,
        out: String::with_capacity(signature.len()),
        class_file,
        map_class,
    };
    parser.top_level()?;
    Ok(parser.out)
}

struct SignatureRemapper<'a, F> {
    input: &'a str,
    pos: usize,
    out: String,
    class_file: &'a str,
    map_class: &'a mut F,
}

impl<'a, F> SignatureRemapper<'a, F>
where
    F: FnMut(&str) -> BuildResult<String>,
{
    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn error(&self, message: &str) -> BuildError {
        BuildError::ClassFormat {
            path: self.class_file.to_string(),
            message: format!(
                "{message} at offset {} of signature '{}'",
                self.pos, self.input
            ),
        }
    }

    fn expect(&mut self, byte: u8) -> BuildResult<()> {
        if self.peek() != Some(byte) {
            return Err(self.error(&format!("expected '{}'", byte as char)));
        }
        self.out.push(byte as char);
        self.pos += 1;
        Ok(())
    }

    /// Consume up to (not including) any byte in `stops`.
    fn take_until(&mut self, stops: &[u8]) -> BuildResult<&'a str> {
        let input = self.input;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if stops.contains(&b) {
                return Ok(&input[start..self.pos]);
            }
            self.pos += 1;
        }
        Err(self.error("unterminated name"))
    }

    fn top_level(&mut self) -> BuildResult<()> {
        if self.peek() == Some(b'<') {
            self.type_parameters()?;
        }
        if self.peek() == Some(b'(') {
            self.expect(b'(')?;
            while self.peek() != Some(b')') {
                if self.peek().is_none() {
                    return Err(self.error("unterminated parameter list"));
                }
                self.java_type()?;
            }
            self.expect(b')')?;
            self.java_type()?;
            while self.peek() == Some(b'^') {
                self.expect(b'^')?;
                self.reference_type()?;
            }
        } else {
            // field type, or superclass followed by interfaces
            while self.peek().is_some() {
                self.java_type()?;
            }
        }
        if self.pos != self.input.len() {
            return Err(self.error("trailing characters"));
        }
        Ok(())
    }

    fn type_parameters(&mut self) -> BuildResult<()> {
        self.expect(b'<')?;
        while self.peek() != Some(b'>') {
            let ident = self.take_until(b":>")?;
            if ident.is_empty() {
                return Err(self.error("empty type parameter name"));
            }
            self.out.push_str(ident);
            while self.peek() == Some(b':') {
                self.expect(b':')?;
                if matches!(self.peek(), Some(b'L' | b'T' | b'[')) {
                    self.reference_type()?;
                }
            }
        }
        self.expect(b'>')
    }

    fn java_type(&mut self) -> BuildResult<()> {
        match self.peek() {
            Some(b @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V')) => {
                self.out.push(b as char);
                self.pos += 1;
                Ok(())
            }
            Some(_) => self.reference_type(),
            None => Err(self.error("expected a type")),
        }
    }

    fn reference_type(&mut self) -> BuildResult<()> {
        match self.peek() {
            Some(b'L') => self.class_type(),
            Some(b'T') => {
                let var = self.take_until(b";")?;
                self.out.push_str(var);
                self.expect(b';')
            }
            Some(b'[') => {
                self.expect(b'[')?;
                self.java_type()
            }
            _ => Err(self.error("expected a reference type")),
        }
    }

    fn class_type(&mut self) -> BuildResult<()> {
        self.expect(b'L')?;
        let name = self.take_until(b"<;.")?;
        if name.is_empty() {
            return Err(self.error("empty class name"));
        }
        let mapped = (self.map_class)(name)?;
        self.out.push_str(&mapped);
        let mut outer = name.to_string();

        loop {
            match self.peek() {
                Some(b'<') => self.type_arguments()?,
                Some(b'.') => {
                    self.expect(b'.')?;
                    let simple = self.take_until(b"<;.")?;
                    let inner = format!("{outer}${simple}");
                    let mapped_inner = (self.map_class)(&inner)?;
                    let mapped_simple = match mapped_inner.rsplit_once('$') {
                        Some((_, tail)) if mapped_inner != inner => tail.to_string(),
                        _ => simple.to_string(),
                    };
                    self.out.push_str(&mapped_simple);
                    outer = inner;
                }
                Some(b';') => return self.expect(b';'),
                _ => return Err(self.error("unterminated class type")),
            }
        }
    }

    fn type_arguments(&mut self) -> BuildResult<()> {
        self.expect(b'<')?;
        while self.peek() != Some(b'>') {
            match self.peek() {
                Some(b'*') => self.expect(b'*')?,
                Some(b @ (b'+' | b'-')) => {
                    self.expect(b)?;
                    self.reference_type()?;
                }
                Some(_) => self.reference_type()?,
                None => return Err(self.error("unterminated type arguments")),
            }
        }
        self.expect(b'>')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remap(sig: &str) -> BuildResult<String> {
        let mut map = |name: &str| -> BuildResult<String> {
            Ok(match name {
                "net/minecraft/server/level/ServerPlayer" => "net/minecraft/server/level/EntityPlayer".into(),
                "net/minecraft/world/entity/Entity$RemovalReason" => "net/minecraft/world/entity/Entity$a".into(),
                "net/minecraft/world/entity/Entity" => "net/minecraft/world/entity/Entity".into(),
                other => other.to_string(),
            })
        };
        remap_signature(sig, "Test.class", &mut map)
    }

    #[test]
    fn descriptors() {
        assert_eq!(
            remap("(ILnet/minecraft/server/level/ServerPlayer;[J)V").unwrap(),
            "(ILnet/minecraft/server/level/EntityPlayer;[J)V"
        );
        assert_eq!(
            remap("[[Lnet/minecraft/server/level/ServerPlayer;").unwrap(),
            "[[Lnet/minecraft/server/level/EntityPlayer;"
        );
    }

    #[test]
    fn generic_signatures() {
        assert_eq!(
            remap("<T:Ljava/lang/Object;P::Ljava/lang/Comparable<-TP;>;>(Ljava/util/List<+Lnet/minecraft/server/level/ServerPlayer;>;TT;)TP;^Ljava/io/IOException;").unwrap(),
            "<T:Ljava/lang/Object;P::Ljava/lang/Comparable<-TP;>;>(Ljava/util/List<+Lnet/minecraft/server/level/EntityPlayer;>;TT;)TP;^Ljava/io/IOException;"
        );
        assert_eq!(
            remap("Ljava/util/Map<Ljava/lang/String;*>;").unwrap(),
            "Ljava/util/Map<Ljava/lang/String;*>;"
        );
    }

    #[test]
    fn inner_class_suffixes() {
        assert_eq!(
            remap("Lnet/minecraft/world/entity/Entity.RemovalReason;").unwrap(),
            "Lnet/minecraft/world/entity/Entity.a;"
        );
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(remap("(I").is_err());
        assert!(remap("Lfoo/Bar").is_err());
        assert!(remap("Q").is_err());
    }
}

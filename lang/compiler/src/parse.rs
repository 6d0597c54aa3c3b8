use lang_component::{
    block::{Block, Opcode},
    expr::{AddrMode, Condition, Conditional, Expression, Logic, Operand, Operator, Test},
    value::Value,
};

use crate::{tokenize::Token, CompileError, Compiler};

impl<'a> Compiler<'a> {
    pub(crate) fn preprocess(&mut self) {
        self.symtab.insert("[none]".to_string(), 0);
        self.symtab.insert("[take-no-jump]".to_string(), -1);
        self.symtab.insert("[true]".to_string(), 1);
        self.symtab.insert("[false]".to_string(), 0);
    }

    fn parse_token(&mut self) -> Result<Token, CompileError> {
        self.tokens.pop_front().ok_or(CompileError::OutOfTokens)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.tokens.front()
    }

    fn parse_keyword(&mut self, keyword: &str) -> Result<(), CompileError> {
        let token = self.parse_token()?;
        if token.text != keyword {
            return Err(parse_error(
                &format!("Missing keyword {}.", keyword),
                &token,
            ));
        }
        Ok(())
    }

    fn parse_number(&mut self) -> Result<i64, CompileError> {
        let token = self.parse_token()?;
        token
            .text
            .parse::<i64>()
            .map_err(|_| parse_error("Invalid number.", &token))
    }

    /// Writes a finished command block at the write pointer and advances.
    fn emit(&mut self, block: Block) -> Result<(), CompileError> {
        *self.memory.get_mut(self.pointer)? = block;
        self.pointer += 1;
        Ok(())
    }

    fn symbol(name: &str) -> String {
        format!("[{}]", name)
    }

    pub(crate) fn parse_statements(&mut self) -> Result<(), CompileError> {
        while let Some(token) = self.tokens.pop_front() {
            match token.text.as_str() {
                "define" => {
                    let name = self.parse_token()?;
                    self.parse_keyword("as")?;
                    let number = self.parse_number()?;
                    self.symtab.insert(Self::symbol(&name.text), number);
                }
                "map" => {
                    let mut index = 0;
                    loop {
                        let item = self.parse_token()?;
                        if item.text == "end" {
                            break;
                        }
                        self.symtab.insert(Self::symbol(&item.text), index);
                        index += 1;
                    }
                }
                "label" => {
                    let name = self.parse_token()?;
                    self.symtab.insert(Self::symbol(&name.text), self.pointer);
                }
                "number" => {
                    let number = self.parse_number()?;
                    self.memory.get_mut(self.pointer)?.value = Value::Number(number);
                    self.pointer += 1;
                }
                "list" => {
                    let count = self.parse_number()?;
                    for _ in 0..count {
                        self.memory.get_mut(self.pointer)?.value = Value::Number(0);
                        self.pointer += 1;
                    }
                }
                "object" => {
                    let mut fields = Vec::new();
                    loop {
                        let property = self.parse_token()?;
                        if property.text == "end" {
                            break;
                        }
                        match property.text.split_once('=') {
                            Some((name, value)) => {
                                fields.push((name.to_string(), Value::detect(value)));
                            }
                            None => {
                                return Err(parse_error("Invalid property format.", &property))
                            }
                        }
                    }
                    let block = self.memory.get_mut(self.pointer)?;
                    for (name, value) in fields {
                        block.fields.insert(name, value);
                    }
                    self.pointer += 1;
                }
                "{remark}" => loop {
                    let token = self.parse_token()?;
                    if token.text == "{end}" {
                        break;
                    }
                },
                "store" => {
                    let mut command = Block::new();
                    command.code = Opcode::Store;
                    self.parse_expression(&mut command)?;
                    self.parse_keyword("at")?;
                    self.parse_expression(&mut command)?; // Destination
                    self.emit(command)?;
                }
                "set" => {
                    let mut command = Block::new();
                    command.code = Opcode::Set;
                    self.parse_expression(&mut command)?; // Destination
                    self.parse_expression(&mut command)?; // Field
                    self.parse_keyword("to")?;
                    self.parse_expression(&mut command)?;
                    self.emit(command)?;
                }
                "test" => {
                    let mut command = Block::new();
                    command.code = Opcode::Test;
                    self.parse_conditional(&mut command)?;
                    self.parse_keyword("then")?;
                    self.parse_expression(&mut command)?;
                    self.parse_keyword("otherwise")?;
                    self.parse_expression(&mut command)?;
                    self.emit(command)?;
                }
                "call" => {
                    let mut command = Block::new();
                    command.code = Opcode::Call;
                    self.parse_expression(&mut command)?;
                    self.emit(command)?;
                }
                "return" => {
                    let mut command = Block::new();
                    command.code = Opcode::Return;
                    self.emit(command)?;
                }
                "stop" => {
                    let mut command = Block::new();
                    command.code = Opcode::Stop;
                    self.emit(command)?;
                }
                "output" => {
                    let mut command = Block::new();
                    command.code = Opcode::Output;
                    self.parse_expression(&mut command)?; // Text
                    self.parse_keyword("at")?;
                    self.parse_expression(&mut command)?; // Coordinates
                    self.parse_expression(&mut command)?;
                    self.parse_keyword("color")?;
                    self.parse_expression(&mut command)?; // Red
                    self.parse_expression(&mut command)?; // Green
                    self.parse_expression(&mut command)?; // Blue
                    self.emit(command)?;
                }
                "draw" => {
                    let mut command = Block::new();
                    command.code = Opcode::Draw;
                    self.parse_expression(&mut command)?; // Picture name
                    self.parse_keyword("at")?;
                    self.parse_expression(&mut command)?; // Coordinates
                    self.parse_expression(&mut command)?;
                    self.parse_expression(&mut command)?; // Dimensions
                    self.parse_expression(&mut command)?;
                    self.parse_keyword("angle")?;
                    self.parse_expression(&mut command)?;
                    self.parse_keyword("flip")?;
                    self.parse_expression(&mut command)?;
                    self.parse_expression(&mut command)?;
                    self.emit(command)?;
                }
                "refresh" => {
                    let mut command = Block::new();
                    command.code = Opcode::Refresh;
                    self.emit(command)?;
                }
                "sound" => {
                    let mut command = Block::new();
                    command.code = Opcode::Sound;
                    self.parse_expression(&mut command)?;
                    self.emit(command)?;
                }
                "music" => {
                    let mut command = Block::new();
                    command.code = Opcode::Music;
                    self.parse_expression(&mut command)?;
                    self.emit(command)?;
                }
                "silence" => {
                    let mut command = Block::new();
                    command.code = Opcode::Silence;
                    self.emit(command)?;
                }
                "input" => {
                    let mut command = Block::new();
                    command.code = Opcode::Input;
                    self.parse_expression(&mut command)?; // Destination
                    self.emit(command)?;
                }
                "timeout" => {
                    let mut command = Block::new();
                    command.code = Opcode::Timeout;
                    self.parse_expression(&mut command)?;
                    self.emit(command)?;
                }
                "color" => {
                    let mut command = Block::new();
                    command.code = Opcode::Color;
                    self.parse_expression(&mut command)?; // Red
                    self.parse_expression(&mut command)?; // Green
                    self.parse_expression(&mut command)?; // Blue
                    self.emit(command)?;
                }
                "load" => {
                    let mut command = Block::new();
                    command.code = Opcode::Load;
                    self.parse_expression(&mut command)?; // File name
                    self.parse_keyword("at")?;
                    self.parse_expression(&mut command)?; // Destination
                    self.parse_keyword("count")?;
                    self.parse_expression(&mut command)?;
                    self.emit(command)?;
                }
                "save" => {
                    let mut command = Block::new();
                    command.code = Opcode::Save;
                    self.parse_expression(&mut command)?; // Source
                    self.parse_keyword("to")?;
                    self.parse_expression(&mut command)?; // File name
                    self.parse_keyword("count")?;
                    self.parse_expression(&mut command)?;
                    self.emit(command)?;
                }
                "push" => {
                    let mut command = Block::new();
                    command.code = Opcode::Push;
                    self.parse_expression(&mut command)?;
                    self.emit(command)?;
                }
                "pop" => {
                    let mut command = Block::new();
                    command.code = Opcode::Pop;
                    self.parse_expression(&mut command)?; // Destination
                    self.emit(command)?;
                }
                "repeat" => {
                    let mut command = Block::new();
                    command.code = Opcode::Repeat;
                    self.parse_expression(&mut command)?; // Lower
                    self.parse_keyword("to")?;
                    self.parse_expression(&mut command)?; // Upper
                    self.parse_keyword("for")?;
                    self.parse_expression(&mut command)?; // Counter
                    self.parse_keyword("jump")?;
                    self.parse_expression(&mut command)?;
                    self.emit(command)?;
                }
                "get-object" => {
                    let mut command = Block::new();
                    command.code = Opcode::GetObject;
                    self.parse_expression(&mut command)?; // Destination
                    self.parse_keyword("from")?;
                    self.parse_expression(&mut command)?; // Source
                    self.parse_expression(&mut command)?; // Field
                    self.emit(command)?;
                }
                "get-list" => {
                    let mut command = Block::new();
                    command.code = Opcode::GetList;
                    self.parse_expression(&mut command)?; // Destination
                    self.parse_keyword("from")?;
                    self.parse_expression(&mut command)?; // Source
                    self.parse_expression(&mut command)?; // Field
                    self.emit(command)?;
                }
                _ => {
                    return Err(parse_error(
                        &format!("Invalid statement {}.", token.text),
                        &token,
                    ));
                }
            }
        }
        Ok(())
    }

    /// Parses `Operand (Operator Operand)*` into the command and returns the
    /// expression's index. Statement parsers consume expressions by
    /// position, so the index is usually ignored.
    fn parse_expression(&mut self, command: &mut Block) -> Result<usize, CompileError> {
        let mut expression = Expression::new(self.parse_operand()?);
        while self.is_operator() {
            let operator = self.parse_operator()?;
            let operand = self.parse_operand()?;
            expression.tail.push((operator, operand));
        }
        command.expressions.push(expression);
        Ok(command.expressions.len() - 1)
    }

    fn parse_operand(&mut self) -> Result<Operand, CompileError> {
        let token = self.parse_token()?;
        let mut chars = token.text.chars();
        let selector = match chars.next() {
            Some(c) if token.text.chars().count() >= 2 => c,
            _ => return Err(parse_error("Invalid operand token.", &token)),
        };
        let rest = chars.as_str();

        let operand = match selector {
            '#' => {
                let mut operand = Operand::new(AddrMode::Immediate);
                self.parse_address(rest, &mut operand, &token)?;
                operand
            }
            '@' => {
                let mut operand = Operand::new(AddrMode::Pointer);
                self.parse_address(rest, &mut operand, &token)?;
                operand
            }
            '$' => {
                // String literal; never a placeholder.
                let mut operand = Operand::new(AddrMode::LiteralString);
                operand.value = Value::String(rest.to_string());
                operand
            }
            _ => {
                let mut operand = Operand::new(AddrMode::LiteralNumber);
                self.parse_address(&token.text, &mut operand, &token)?;
                operand
            }
        };
        Ok(operand)
    }

    /// Parses address text, which may carry an `->field` suffix. Text that
    /// is not a number is kept as a placeholder for the resolution pass.
    fn parse_address(
        &mut self,
        text: &str,
        operand: &mut Operand,
        token: &Token,
    ) -> Result<(), CompileError> {
        let parts: Vec<&str> = text.split("->").collect();
        let address = match parts.as_slice() {
            [address] => *address,
            [address, field] => {
                if operand.mode == AddrMode::LiteralNumber {
                    return Err(parse_error(
                        "Cannot have object notation with numeric value.",
                        token,
                    ));
                }
                operand.field = Some(field.to_string());
                *address
            }
            _ => return Err(parse_error(&format!("Invalid address {}.", text), token)),
        };

        match address.parse::<i64>() {
            Ok(number) => operand.value = Value::Number(number),
            Err(_) => operand.placeholder = Some(address.to_string()),
        }
        Ok(())
    }

    fn parse_operator(&mut self) -> Result<Operator, CompileError> {
        let token = self.parse_token()?;
        match token.text.as_str() {
            "+" => Ok(Operator::Add),
            "-" => Ok(Operator::Sub),
            "*" => Ok(Operator::Mul),
            "/" => Ok(Operator::Div),
            "rem" => Ok(Operator::Rem),
            "rand" => Ok(Operator::Rand),
            "cos" => Ok(Operator::Cos),
            "sin" => Ok(Operator::Sin),
            "cat" => Ok(Operator::Cat),
            _ => Err(parse_error("Invalid operator.", &token)),
        }
    }

    fn is_operator(&self) -> bool {
        matches!(
            self.peek_token().map(|token| token.text.as_str()),
            Some("+" | "-" | "*" | "/" | "rem" | "rand" | "cos" | "sin" | "cat")
        )
    }

    fn parse_conditional(&mut self, command: &mut Block) -> Result<(), CompileError> {
        let mut conditional = Conditional::new(self.parse_condition(command)?);
        while self.is_logic() {
            let logic = self.parse_logic()?;
            let condition = self.parse_condition(command)?;
            conditional.tail.push((logic, condition));
        }
        command.conditional = Some(conditional);
        Ok(())
    }

    fn parse_condition(&mut self, command: &mut Block) -> Result<Condition, CompileError> {
        let left = self.parse_expression(command)?;
        let token = self.parse_token()?;
        let test = match token.text.as_str() {
            "eq" => Test::Equals,
            "not" => Test::Not,
            "lt" => Test::Less,
            "gt" => Test::Greater,
            "le" => Test::LessOrEqual,
            "ge" => Test::GreaterOrEqual,
            _ => return Err(parse_error("Invalid test.", &token)),
        };
        let right = self.parse_expression(command)?;
        Ok(Condition { left, test, right })
    }

    fn parse_logic(&mut self) -> Result<Logic, CompileError> {
        let token = self.parse_token()?;
        match token.text.as_str() {
            "and" => Ok(Logic::And),
            "or" => Ok(Logic::Or),
            _ => Err(parse_error("Invalid logic token.", &token)),
        }
    }

    fn is_logic(&self) -> bool {
        matches!(
            self.peek_token().map(|token| token.text.as_str()),
            Some("and" | "or")
        )
    }

    /// Fills in every operand whose address text was an identifier. Bare
    /// names look up their bracketed form, so `#start` and
    /// `#[take-no-jump]` both resolve.
    pub(crate) fn replace_placeholders(&mut self) -> Result<(), CompileError> {
        for address in 0..self.memory.size() as i64 {
            let block = self.memory.get_mut(address)?;
            for expression in &mut block.expressions {
                for operand in expression.operands_mut() {
                    if let Some(placeholder) = operand.placeholder.take() {
                        let key = if placeholder.starts_with('[') {
                            placeholder.clone()
                        } else {
                            Self::symbol(&placeholder)
                        };
                        match self.symtab.get(&key) {
                            Some(value) => operand.value = Value::Number(*value),
                            None => {
                                return Err(CompileError::UnresolvedPlaceholder(placeholder));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_error(message: &str, token: &Token) -> CompileError {
    CompileError::Parse {
        message: message.to_string(),
        token: token.text.clone(),
        source_name: token.source.clone(),
        line_no: token.line_no,
    }
}

#[cfg(test)]
mod parser_test {
    use super::*;
    use crate::compile_source;
    use lang_component::memory::Memory;

    fn compile(source: &str) -> Memory {
        let mut memory = Memory::new(64);
        compile_source("test", source, &mut memory).unwrap();
        memory
    }

    fn compile_err(source: &str) -> CompileError {
        let mut memory = Memory::new(64);
        compile_source("test", source, &mut memory).unwrap_err()
    }

    #[test]
    fn test_number_statement() {
        let memory = compile("number 12\nnumber -3");
        assert_eq!(memory.get(0).unwrap().value, Value::Number(12));
        assert_eq!(memory.get(1).unwrap().value, Value::Number(-3));
    }

    #[test]
    fn test_list_statement() {
        let memory = compile("list 3\nnumber 9");
        assert_eq!(memory.get(2).unwrap().value, Value::Number(0));
        assert_eq!(memory.get(3).unwrap().value, Value::Number(9));
    }

    #[test]
    fn test_object_statement() {
        let memory = compile("object hp=10 name=slime end");
        let block = memory.get(0).unwrap();
        assert_eq!(block.fields.get("hp"), Some(&Value::Number(10)));
        assert_eq!(
            block.fields.get("name"),
            Some(&Value::String("slime".to_string()))
        );
    }

    #[test]
    fn test_label_and_define_resolution() {
        let memory = compile("define limit as 3\nlabel start\nstore #limit at #10\nstop");
        let command = memory.get(0).unwrap();
        assert_eq!(command.code, Opcode::Store);
        assert_eq!(command.expressions[0].head.value, Value::Number(3));
        assert_eq!(command.expressions[1].head.value, Value::Number(10));
    }

    #[test]
    fn test_map_statement() {
        let memory = compile("map stone grass water end\nstore #water at #10");
        let command = memory.get(0).unwrap();
        assert_eq!(command.expressions[0].head.value, Value::Number(2));
    }

    #[test]
    fn test_predefined_symbols() {
        let memory = compile("store #[take-no-jump] at #10\nstore #[true] at #11");
        assert_eq!(
            memory.get(0).unwrap().expressions[0].head.value,
            Value::Number(-1)
        );
        assert_eq!(
            memory.get(1).unwrap().expressions[0].head.value,
            Value::Number(1)
        );
    }

    #[test]
    fn test_expression_chain_shape() {
        let memory = compile("store #5 + #7 * #2 at #10");
        let command = memory.get(0).unwrap();
        assert_eq!(command.expressions.len(), 2);
        assert_eq!(command.expressions[0].tail.len(), 2);
        assert_eq!(command.expressions[0].len() % 2, 1);
        assert_eq!(command.expressions[0].tail[0].0, Operator::Add);
        assert_eq!(command.expressions[0].tail[1].0, Operator::Mul);
    }

    #[test]
    fn test_operand_modes() {
        let memory = compile("store @7 cat $txt at #10->hp");
        let command = memory.get(0).unwrap();
        assert_eq!(command.expressions[0].head.mode, AddrMode::Pointer);
        assert_eq!(
            command.expressions[0].tail[0].1.mode,
            AddrMode::LiteralString
        );
        assert_eq!(
            command.expressions[0].tail[0].1.value,
            Value::String("txt".to_string())
        );
        let destination = &command.expressions[1].head;
        assert_eq!(destination.mode, AddrMode::Immediate);
        assert_eq!(destination.field.as_deref(), Some("hp"));
    }

    #[test]
    fn test_conditional_shape() {
        let memory = compile("test #1 eq #2 or #3 gt #4 then #9 otherwise #[take-no-jump]");
        let command = memory.get(0).unwrap();
        let conditional = command.conditional.as_ref().unwrap();
        assert_eq!(conditional.len(), 3);
        assert_eq!(conditional.head.test, Test::Equals);
        assert_eq!(conditional.tail[0].0, Logic::Or);
        assert_eq!(conditional.tail[0].1.test, Test::Greater);
        // Conditions 0/1, 2/3; then/otherwise land at the last two indices.
        assert_eq!(command.expressions.len(), 6);
    }

    #[test]
    fn test_remark_is_skipped() {
        let memory = compile("{remark} anything goes here store 5 {end}\nnumber 4");
        assert_eq!(memory.get(0).unwrap().value, Value::Number(4));
    }

    #[test]
    fn test_no_placeholders_after_compile() {
        let memory = compile("label start\ntest #1 eq #1 then #start otherwise #[take-no-jump]");
        for address in 0..memory.size() as i64 {
            for expression in &memory.get(address).unwrap().expressions {
                assert!(expression.head.placeholder.is_none());
                for (_, operand) in &expression.tail {
                    assert!(operand.placeholder.is_none());
                }
            }
        }
    }

    #[test]
    fn test_unresolved_placeholder() {
        let err = compile_err("store #nowhere at #10");
        assert!(matches!(err, CompileError::UnresolvedPlaceholder(name) if name == "nowhere"));
    }

    #[test]
    fn test_invalid_statement() {
        let err = compile_err("frobnicate");
        assert!(err.to_string().contains("Invalid statement frobnicate."));
    }

    #[test]
    fn test_missing_keyword() {
        let err = compile_err("store #1 nowhere #10");
        assert!(err.to_string().contains("Missing keyword at."));
    }

    #[test]
    fn test_short_operand_token() {
        let err = compile_err("push 5");
        assert!(err.to_string().contains("Invalid operand token."));
    }

    #[test]
    fn test_object_notation_on_number() {
        let err = compile_err("push 12->hp");
        assert!(err
            .to_string()
            .contains("Cannot have object notation with numeric value."));
    }

    #[test]
    fn test_invalid_property_format() {
        let err = compile_err("object broken end");
        assert!(err.to_string().contains("Invalid property format."));
    }

    #[test]
    fn test_error_carries_location() {
        let err = compile_err("number 1\nfrobnicate");
        match err {
            CompileError::Parse {
                source_name,
                line_no,
                ..
            } => {
                assert_eq!(source_name, "test");
                assert_eq!(line_no, 1);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_import_inlines_tokens() {
        let dir = std::env::temp_dir().join("clesh_import_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("library.clsh");
        std::fs::write(&path, "number 41\n").unwrap();

        let name = dir.join("library");
        let source = format!("import {}\nnumber 42", name.display());
        let memory = compile(&source);
        assert_eq!(memory.get(0).unwrap().value, Value::Number(41));
        assert_eq!(memory.get(1).unwrap().value, Value::Number(42));
    }

    #[test]
    fn test_invalid_import() {
        let err = compile_err("import one two");
        assert!(matches!(err, CompileError::InvalidImport { line_no: 0, .. }));
    }

    #[test]
    fn test_program_too_large() {
        let mut memory = Memory::new(2);
        let err = compile_source("test", "number 1\nnumber 2\nnumber 3", &mut memory).unwrap_err();
        assert!(matches!(err, CompileError::Memory(_)));
    }
}

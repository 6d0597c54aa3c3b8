use std::time::{Duration, Instant};

use tracing::trace;

use lang_component::{
    block::{Block, Opcode},
    expr::{AddrMode, Condition, Logic, Operand, Operator, Test},
    io::IoControl,
    memory::Memory,
    value::Value,
};

use crate::{
    error::{RuntimeError, RuntimeErrorKind},
    storage, Status, VM,
};

/// A jump target equal to this sentinel leaves the pointer alone.
const TAKE_NO_JUMP: i64 = -1;

// The language's contractual approximation of pi. Program numerics depend
// on it; do not substitute a more accurate constant.
const SCRIPT_PI: f64 = 3.14;

fn scaled_trig(value: i64, degrees: i64, f: fn(f64) -> f64) -> i64 {
    (value as f64 * f(degrees as f64 * SCRIPT_PI / 180.0)).floor() as i64
}

impl VM {
    /// Executes one time slice: commands run in program order until the
    /// budget elapses or the program stops. The budget is advisory; a
    /// fetched command always completes.
    pub fn run(
        &mut self,
        memory: &mut Memory,
        io: &mut dyn IoControl,
        timeout_ms: u64,
    ) -> Result<(), RuntimeError> {
        if self.status == Status::Idle {
            self.status = Status::Running;
        }

        let start = Instant::now();
        let budget = Duration::from_millis(timeout_ms);
        while self.status == Status::Running {
            if start.elapsed() >= budget {
                break;
            }

            let pointer = self.pointer;
            // Fetch-then-execute on a copy: a command that stores into its
            // own cell finishes as fetched, and the new contents take
            // effect on the next visit.
            let command = match memory.get(pointer) {
                Ok(block) => block.clone(),
                Err(err) => {
                    return Err(RuntimeError {
                        kind: err.into(),
                        code: Opcode::None,
                        pointer,
                    })
                }
            };
            self.pointer += 1;
            trace!(pointer, code = ?command.code, "execute");

            self.process(&command, memory, io)
                .map_err(|kind| RuntimeError {
                    kind,
                    code: command.code,
                    pointer,
                })?;
        }
        Ok(())
    }

    fn process(
        &mut self,
        command: &Block,
        memory: &mut Memory,
        io: &mut dyn IoControl,
    ) -> Result<(), RuntimeErrorKind> {
        match command.code {
            Opcode::None => {}
            Opcode::Store => {
                let result = self.eval_expression(command, 0, memory, io)?;
                let pointer = self.eval_expression(command, 1, memory, io)?;
                memory.get_mut(pointer.number())?.value = result;
            }
            Opcode::Set => {
                let pointer = self.eval_expression(command, 0, memory, io)?;
                let field = self.eval_expression(command, 1, memory, io)?;
                let value = self.eval_expression(command, 2, memory, io)?;
                memory
                    .get_mut(pointer.number())?
                    .fields
                    .insert(field.text().to_string(), value);
            }
            Opcode::Test => {
                let result = self.eval_conditional(command, memory, io)?;
                let count = command.expressions.len();
                let pass_index = count
                    .checked_sub(2)
                    .ok_or(RuntimeErrorKind::MissingExpression(0))?;
                let passed = self.eval_expression(command, pass_index, memory, io)?;
                let failed = self.eval_expression(command, count - 1, memory, io)?;
                if result != 0 {
                    if passed.number() != TAKE_NO_JUMP {
                        self.pointer = passed.number();
                    }
                } else if failed.number() != TAKE_NO_JUMP {
                    self.pointer = failed.number();
                }
            }
            Opcode::Call => {
                let target = self.eval_expression(command, 0, memory, io)?;
                // The pointer already names the next command; that is the
                // return address.
                self.stack.push(self.pointer);
                self.pointer = target.number();
            }
            Opcode::Return => {
                self.pointer = self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)?;
            }
            Opcode::Stop => {
                self.status = Status::Done;
            }
            Opcode::Output => {
                let text = self.eval_expression(command, 0, memory, io)?;
                let x = self.eval_expression(command, 1, memory, io)?;
                let y = self.eval_expression(command, 2, memory, io)?;
                let red = self.eval_expression(command, 3, memory, io)?;
                let green = self.eval_expression(command, 4, memory, io)?;
                let blue = self.eval_expression(command, 5, memory, io)?;
                io.output_text(
                    text.text(),
                    x.number(),
                    y.number(),
                    red.number(),
                    green.number(),
                    blue.number(),
                );
            }
            Opcode::Draw => {
                let name = self.eval_expression(command, 0, memory, io)?;
                let x = self.eval_expression(command, 1, memory, io)?;
                let y = self.eval_expression(command, 2, memory, io)?;
                let width = self.eval_expression(command, 3, memory, io)?;
                let height = self.eval_expression(command, 4, memory, io)?;
                let angle = self.eval_expression(command, 5, memory, io)?;
                let flip_x = self.eval_expression(command, 6, memory, io)?;
                let flip_y = self.eval_expression(command, 7, memory, io)?;
                io.draw_image(
                    name.text(),
                    x.number(),
                    y.number(),
                    width.number(),
                    height.number(),
                    angle.number(),
                    flip_x.number(),
                    flip_y.number(),
                );
            }
            Opcode::Refresh => io.refresh(),
            Opcode::Sound => {
                let name = self.eval_expression(command, 0, memory, io)?;
                io.play_sound(name.text());
            }
            Opcode::Music => {
                let name = self.eval_expression(command, 0, memory, io)?;
                io.play_music(name.text());
            }
            Opcode::Silence => io.silence(),
            Opcode::Input => {
                let pointer = self.eval_expression(command, 0, memory, io)?;
                let signal = io.read_signal();
                memory.get_mut(pointer.number())?.value = Value::Number(signal.code);
            }
            Opcode::Timeout => {
                let ms = self.eval_expression(command, 0, memory, io)?;
                io.timeout(ms.number());
            }
            Opcode::Color => {
                let red = self.eval_expression(command, 0, memory, io)?;
                let green = self.eval_expression(command, 1, memory, io)?;
                let blue = self.eval_expression(command, 2, memory, io)?;
                io.color(red.number(), green.number(), blue.number());
            }
            Opcode::Load => {
                let name = self.eval_expression(command, 0, memory, io)?;
                let address = self.eval_expression(command, 1, memory, io)?;
                // The count expression is part of the statement but the
                // stored count comes from the file's object groups.
                let _ = self.eval_expression(command, 2, memory, io)?;
                let count = storage::load(name.text(), memory, address.number())?;
                memory.get_mut(address.number())?.value = Value::Number(count);
            }
            Opcode::Save => {
                let address = self.eval_expression(command, 0, memory, io)?;
                let name = self.eval_expression(command, 1, memory, io)?;
                let count = self.eval_expression(command, 2, memory, io)?;
                storage::save(name.text(), memory, address.number(), count.number())?;
            }
            Opcode::Push => {
                let value = self.eval_expression(command, 0, memory, io)?;
                self.stack.push(value.number());
            }
            Opcode::Pop => {
                let pointer = self.eval_expression(command, 0, memory, io)?;
                let value = self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)?;
                memory.get_mut(pointer.number())?.value = Value::Number(value);
            }
            Opcode::Repeat => {
                let lower = self.eval_expression(command, 0, memory, io)?.number();
                let upper = self.eval_expression(command, 1, memory, io)?.number();
                let pointer = self.eval_expression(command, 2, memory, io)?;
                let target = self.eval_expression(command, 3, memory, io)?;
                let counter = memory.get_mut(pointer.number())?;
                let current = counter.value.number();
                if current < lower || current > upper {
                    // Out of range: reset and start the loop body.
                    counter.value = Value::Number(lower);
                    self.pointer = target.number();
                } else {
                    let next = current.wrapping_add(1);
                    counter.value = Value::Number(next);
                    if next <= upper {
                        self.pointer = target.number();
                    }
                }
            }
            Opcode::GetObject => {
                let pointer = self.eval_expression(command, 0, memory, io)?;
                let object = self.eval_expression(command, 1, memory, io)?;
                let field = self.eval_expression(command, 2, memory, io)?;
                let serialized = {
                    let source = memory.get(object.number())?;
                    field_value(source, field.text())?.text().to_string()
                };
                let destination = memory.get_mut(pointer.number())?;
                // Items separated by '|'; each wipes the destination, so
                // the last item's pairs win.
                for item in serialized.split('|') {
                    destination.fields.clear();
                    for property in item.split(';') {
                        match property.split_once(':') {
                            Some((name, value)) if !value.contains(':') => {
                                destination
                                    .fields
                                    .insert(name.to_string(), Value::detect(value));
                            }
                            _ => return Err(RuntimeErrorKind::InvalidProperty),
                        }
                    }
                }
            }
            Opcode::GetList => {
                let pointer = self.eval_expression(command, 0, memory, io)?;
                let object = self.eval_expression(command, 1, memory, io)?;
                let field = self.eval_expression(command, 2, memory, io)?;
                let serialized = {
                    let source = memory.get(object.number())?;
                    field_value(source, field.text())?.text().to_string()
                };
                for (index, item) in serialized.split(',').enumerate() {
                    memory.get_mut(pointer.number() + index as i64)?.value = Value::detect(item);
                }
            }
        }
        Ok(())
    }

    fn eval_operand(
        &self,
        operand: &Operand,
        memory: &Memory,
    ) -> Result<Value, RuntimeErrorKind> {
        match operand.mode {
            AddrMode::LiteralNumber => Ok(Value::Number(operand.value.number())),
            AddrMode::LiteralString => Ok(Value::String(operand.value.text().to_string())),
            AddrMode::Immediate => match &operand.field {
                // The address itself, spelled immediately.
                None => Ok(Value::Number(operand.value.number())),
                Some(field) => {
                    let block = memory.get(operand.value.number())?;
                    field_value(block, field).cloned()
                }
            },
            AddrMode::Pointer => {
                let block = memory.get(operand.value.number())?;
                match &operand.field {
                    None => Ok(block.value.clone()),
                    Some(field) => {
                        let target = memory.get(block.value.number())?;
                        field_value(target, field).cloned()
                    }
                }
            }
        }
    }

    fn eval_expression(
        &self,
        command: &Block,
        index: usize,
        memory: &Memory,
        io: &mut dyn IoControl,
    ) -> Result<Value, RuntimeErrorKind> {
        let expression = command
            .expressions
            .get(index)
            .ok_or(RuntimeErrorKind::MissingExpression(index))?;

        let mut value = self.eval_operand(&expression.head, memory)?;
        for (operator, operand) in &expression.tail {
            let rhs = self.eval_operand(operand, memory)?;
            value = match operator {
                Operator::Add => Value::Number(value.number().wrapping_add(rhs.number())),
                Operator::Sub => Value::Number(value.number().wrapping_sub(rhs.number())),
                Operator::Mul => Value::Number(value.number().wrapping_mul(rhs.number())),
                Operator::Div => {
                    // Division by zero leaves the accumulator alone.
                    if rhs.number() == 0 {
                        Value::Number(value.number())
                    } else {
                        Value::Number(value.number().wrapping_div(rhs.number()))
                    }
                }
                Operator::Rem => {
                    if rhs.number() == 0 {
                        Value::Number(value.number())
                    } else {
                        Value::Number(value.number().wrapping_rem(rhs.number()))
                    }
                }
                Operator::Rand => {
                    Value::Number(io.get_random_number(value.number(), rhs.number()))
                }
                Operator::Cos => Value::Number(scaled_trig(value.number(), rhs.number(), f64::cos)),
                Operator::Sin => Value::Number(scaled_trig(value.number(), rhs.number(), f64::sin)),
                Operator::Cat => Value::String(format!("{}{}", value.render(), rhs.render())),
            };
        }
        Ok(value)
    }

    fn eval_condition(
        &self,
        command: &Block,
        condition: &Condition,
        memory: &Memory,
        io: &mut dyn IoControl,
    ) -> Result<bool, RuntimeErrorKind> {
        let left = self.eval_expression(command, condition.left, memory, io)?;
        let right = self.eval_expression(command, condition.right, memory, io)?;
        Ok(match condition.test {
            // Equality is typed by the left value; ordering is numeric.
            Test::Equals => match &left {
                Value::Number(n) => *n == right.number(),
                Value::String(s) => s == right.text(),
            },
            Test::Not => match &left {
                Value::Number(n) => *n != right.number(),
                Value::String(s) => s != right.text(),
            },
            Test::Less => left.number() < right.number(),
            Test::Greater => left.number() > right.number(),
            Test::LessOrEqual => left.number() <= right.number(),
            Test::GreaterOrEqual => left.number() >= right.number(),
        })
    }

    /// Combines 0/1 condition results left to right: and multiplies, or
    /// adds. There is no short circuit, and chained ors can exceed 1; any
    /// non-zero total counts as a pass.
    fn eval_conditional(
        &self,
        command: &Block,
        memory: &Memory,
        io: &mut dyn IoControl,
    ) -> Result<i64, RuntimeErrorKind> {
        let conditional = command
            .conditional
            .as_ref()
            .ok_or(RuntimeErrorKind::MissingConditional)?;

        let mut result = self.eval_condition(command, &conditional.head, memory, io)? as i64;
        for (logic, condition) in &conditional.tail {
            let passed = self.eval_condition(command, condition, memory, io)? as i64;
            result = match logic {
                Logic::And => result * passed,
                Logic::Or => result + passed,
            };
        }
        Ok(result)
    }
}

fn field_value<'a>(block: &'a Block, field: &str) -> Result<&'a Value, RuntimeErrorKind> {
    block
        .fields
        .get(field)
        .ok_or_else(|| RuntimeErrorKind::MissingField(field.to_string()))
}

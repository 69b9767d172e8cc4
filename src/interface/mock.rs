//! Mock SPI para pruebas
//!
//! Emula el protocolo de registros del MPU9250 sobre una imagen de 128 registros
//! y registra cada transacción para su verificación.

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::spi::{self, ErrorKind, ErrorType, Operation, SpiDevice};

use crate::register::{ADDRESS_MASK, READ};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

impl spi::Error for MockError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Transacción registrada
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpiTransaction {
    Transfer { write: Vec<u8>, read: Vec<u8> },
}

#[derive(Debug)]
struct MockState {
    registers: [u8; 128],
    transactions: Vec<SpiTransaction>,
    fail_next: usize,
}

impl MockState {
    fn exchange(&mut self, buffer: &mut [u8]) {
        let opcode = buffer[0];
        let address = (opcode & ADDRESS_MASK) as usize;
        buffer[0] = 0x00;

        for (offset, byte) in buffer[1..].iter_mut().enumerate() {
            let reg = (address + offset) & ADDRESS_MASK as usize;
            if opcode & READ != 0 {
                *byte = self.registers[reg];
            } else {
                self.registers[reg] = *byte;
                *byte = 0x00;
            }
        }
    }
}

/// Dispositivo SPI simulado; los clones comparten estado
#[derive(Debug, Clone)]
pub struct MockSpi {
    state: Rc<RefCell<MockState>>,
}

impl MockSpi {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState {
                registers: [0u8; 128],
                transactions: Vec::new(),
                fail_next: 0,
            })),
        }
    }

    pub fn set_register(&self, reg: u8, value: u8) {
        self.state.borrow_mut().registers[reg as usize] = value;
    }

    pub fn set_registers(&self, reg: u8, values: &[u8]) {
        let mut state = self.state.borrow_mut();
        let start = reg as usize;
        state.registers[start..start + values.len()].copy_from_slice(values);
    }

    pub fn register(&self, reg: u8) -> u8 {
        self.state.borrow().registers[reg as usize]
    }

    /// Registro de transacciones (para verificación)
    pub fn transactions(&self) -> Vec<SpiTransaction> {
        self.state.borrow().transactions.clone()
    }

    /// Hace fallar las próximas `count` transacciones
    pub fn fail_next(&self, count: usize) {
        self.state.borrow_mut().fail_next = count;
    }
}

impl ErrorType for MockSpi {
    type Error = MockError;
}

impl SpiDevice for MockSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), MockError> {
        let mut state = self.state.borrow_mut();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(MockError);
        }

        for operation in operations.iter_mut() {
            match operation {
                Operation::TransferInPlace(buffer) => {
                    let write = buffer.to_vec();
                    state.exchange(buffer);
                    state.transactions.push(SpiTransaction::Transfer {
                        write,
                        read: buffer.to_vec(),
                    });
                }
                _ => return Err(MockError),
            }
        }

        Ok(())
    }
}

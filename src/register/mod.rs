//! Definiciones de registros para el MPU9250
//!
//! Mapa de registros del acelerómetro/giroscopio (el magnetómetro AK8963 es un
//! dispositivo I2C secundario y no se expone aquí). Todas las direcciones caben
//! en 7 bits; el bit 7 del byte de opcode indica lectura (1) o escritura (0).

/// Bit de lectura en el byte de opcode
pub const READ: u8 = 0x80;
/// Bit de escritura en el byte de opcode
pub const WRITE: u8 = 0x00;

/// Máscara de dirección de 7 bits
pub const ADDRESS_MASK: u8 = 0x7F;

pub mod registers {
    // Self-test del giroscopio
    pub const SELF_TEST_X_GYRO: u8 = 0x00;
    pub const SELF_TEST_Y_GYRO: u8 = 0x01;
    pub const SELF_TEST_Z_GYRO: u8 = 0x02;

    // Self-test del acelerómetro
    pub const SELF_TEST_X_ACCEL: u8 = 0x0D;
    pub const SELF_TEST_Y_ACCEL: u8 = 0x0E;
    pub const SELF_TEST_Z_ACCEL: u8 = 0x0F;

    // Offsets del giroscopio
    pub const XG_OFFSET_H: u8 = 0x13;
    pub const XG_OFFSET_L: u8 = 0x14;
    pub const YG_OFFSET_H: u8 = 0x15;
    pub const YG_OFFSET_L: u8 = 0x16;
    pub const ZG_OFFSET_H: u8 = 0x17;
    pub const ZG_OFFSET_L: u8 = 0x18;

    // Configuración
    pub const SMPLRT_DIV: u8 = 0x19;
    pub const CONFIG: u8 = 0x1A;
    pub const GYRO_CONFIG: u8 = 0x1B;
    pub const ACCEL_CONFIG: u8 = 0x1C;
    pub const ACCEL_CONFIG_2: u8 = 0x1D;
    pub const LP_ACCEL_ODR: u8 = 0x1E;
    pub const WOM_THR: u8 = 0x1F;

    pub const FIFO_EN: u8 = 0x23;

    // Interrupciones
    pub const INT_PIN_CFG: u8 = 0x37;
    pub const INT_ENABLE: u8 = 0x38;
    pub const INT_STATUS: u8 = 0x3A;

    // Datos del acelerómetro (6 bytes contiguos X/Y/Z, big-endian)
    pub const ACCEL_XOUT_H: u8 = 0x3B;
    pub const ACCEL_XOUT_L: u8 = 0x3C;
    pub const ACCEL_YOUT_H: u8 = 0x3D;
    pub const ACCEL_YOUT_L: u8 = 0x3E;
    pub const ACCEL_ZOUT_H: u8 = 0x3F;
    pub const ACCEL_ZOUT_L: u8 = 0x40;

    // Temperatura
    pub const TEMP_OUT_H: u8 = 0x41;
    pub const TEMP_OUT_L: u8 = 0x42;

    // Datos del giroscopio (6 bytes contiguos X/Y/Z, big-endian)
    pub const GYRO_XOUT_H: u8 = 0x43;
    pub const GYRO_XOUT_L: u8 = 0x44;
    pub const GYRO_YOUT_H: u8 = 0x45;
    pub const GYRO_YOUT_L: u8 = 0x46;
    pub const GYRO_ZOUT_H: u8 = 0x47;
    pub const GYRO_ZOUT_L: u8 = 0x48;

    // Reset y gestión de energía
    pub const SIGNAL_PATH_RESET: u8 = 0x68;
    pub const MOT_DETECT_CTRL: u8 = 0x69;
    pub const USER_CTRL: u8 = 0x6A;
    pub const PWR_MGMT_1: u8 = 0x6B;
    pub const PWR_MGMT_2: u8 = 0x6C;

    // FIFO
    pub const FIFO_COUNT_H: u8 = 0x72;
    pub const FIFO_COUNT_L: u8 = 0x73;
    pub const FIFO_R_W: u8 = 0x74;

    pub const WHO_AM_I: u8 = 0x75;

    // Offsets del acelerómetro (con huecos entre ejes)
    pub const XA_OFFSET_H: u8 = 0x77;
    pub const XA_OFFSET_L: u8 = 0x78;
    pub const YA_OFFSET_H: u8 = 0x7A;
    pub const YA_OFFSET_L: u8 = 0x7B;
    pub const ZA_OFFSET_H: u8 = 0x7D;
    pub const ZA_OFFSET_L: u8 = 0x7E;
}

/// Devuelve `true` si la dirección cabe en 7 bits
#[inline]
pub fn is_valid_address(reg: u8) -> bool {
    reg & !ADDRESS_MASK == 0
}

/// Byte de opcode para leer `reg`
#[inline]
pub fn read_opcode(reg: u8) -> u8 {
    READ | reg
}

/// Byte de opcode para escribir `reg`
#[inline]
pub fn write_opcode(reg: u8) -> u8 {
    WRITE | reg
}

//! Funciones de conversión para datos del sensor MPU9250
//!
//! Los registros de datos son big-endian: byte alto en la dirección menor.
//! Los ejes se interpretan en complemento a dos; la temperatura se combina
//! como entero sin signo, tal como la entrega el registro.

use crate::device::Mpu9250Error;
use crate::types::PhysicalSample;

/// 2^15, fondo de escala de un entero de 16 bits con signo
pub const FULL_SCALE_COUNTS: f64 = 32768.0;

/// Sensibilidad del sensor de temperatura (LSB/°C)
pub const TEMP_SENSITIVITY: f64 = 333.87;
/// Temperatura correspondiente a una lectura de 0
pub const TEMP_OFFSET_C: f64 = 21.0;

/// Decodifica dos bytes big-endian como entero de 16 bits en complemento a dos
pub fn decode_signed16(data: &[u8]) -> Result<i16, Mpu9250Error> {
    let value = decode_unsigned16(data)? as i32;
    // Bit 15 activo: valor negativo
    let value = if value & (1 << 15) != 0 {
        value - (1 << 16)
    } else {
        value
    };
    Ok(value as i16)
}

/// Decodifica dos bytes big-endian como entero de 16 bits sin signo
pub fn decode_unsigned16(data: &[u8]) -> Result<u16, Mpu9250Error> {
    match data {
        [high, low] => Ok(((*high as u16) << 8) | (*low as u16)),
        _ => Err(Mpu9250Error::InvalidLength {
            expected: 2,
            actual: data.len(),
        }),
    }
}

/// Decodifica un bloque de 6 bytes (X, Y, Z) leído desde un registro *_XOUT_H
pub fn decode_xyz(data: &[u8]) -> Result<[i16; 3], Mpu9250Error> {
    if data.len() != 6 {
        return Err(Mpu9250Error::InvalidLength {
            expected: 6,
            actual: data.len(),
        });
    }

    Ok([
        decode_signed16(&data[0..2])?,
        decode_signed16(&data[2..4])?,
        decode_signed16(&data[4..6])?,
    ])
}

/// Convierte un valor bruto a unidades físicas: `full_scale / 2^15 * raw`
#[inline]
pub fn raw_to_physical(raw: i16, full_scale: f64) -> f64 {
    full_scale / FULL_SCALE_COUNTS * raw as f64
}

/// Convierte los tres ejes brutos a una muestra física
pub fn xyz_to_physical(raw: [i16; 3], full_scale: f64) -> PhysicalSample {
    PhysicalSample {
        x: raw_to_physical(raw[0], full_scale),
        y: raw_to_physical(raw[1], full_scale),
        z: raw_to_physical(raw[2], full_scale),
    }
}

/// Convierte datos brutos de temperatura a grados Celsius
pub fn temp_raw_to_celsius(raw: u16) -> f64 {
    raw as f64 / TEMP_SENSITIVITY + TEMP_OFFSET_C
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_round_trip_full_range() {
        for v in i16::MIN..=i16::MAX {
            let bytes = v.to_be_bytes();
            assert_eq!(decode_signed16(&bytes).unwrap(), v);
        }
    }

    #[test]
    fn test_signed_boundaries() {
        assert_eq!(decode_signed16(&[0x80, 0x00]).unwrap(), -32768);
        assert_eq!(decode_signed16(&[0x7F, 0xFF]).unwrap(), 32767);
        assert_eq!(decode_signed16(&[0xFF, 0xFF]).unwrap(), -1);
    }

    #[test]
    fn test_decode_length_contract() {
        for len in [0usize, 1, 3, 4, 6] {
            let data = vec![0u8; len];
            match decode_signed16(&data) {
                Err(Mpu9250Error::InvalidLength { expected, actual }) => {
                    assert_eq!(expected, 2);
                    assert_eq!(actual, len);
                }
                other => panic!("se esperaba InvalidLength, obtenido {:?}", other),
            }
        }
        assert!(decode_unsigned16(&[0x01]).is_err());
        assert!(matches!(
            decode_xyz(&[0u8; 5]),
            Err(Mpu9250Error::InvalidLength { expected: 6, actual: 5 })
        ));
    }

    #[test]
    fn test_scale() {
        // 16384 = bit 14 activo
        let raw = decode_signed16(&[0x40, 0x00]).unwrap();
        assert_eq!(raw, 16384);
        assert_eq!(raw_to_physical(raw, 16.0), 8.0);
        assert_eq!(raw_to_physical(-32768, 2.0), -2.0);
    }

    #[test]
    fn test_xyz() {
        let raw = decode_xyz(&[0x40, 0x00, 0xC0, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(raw, [16384, -16384, 0]);
        let sample = xyz_to_physical(raw, 250.0);
        assert_eq!(sample, PhysicalSample::new(125.0, -125.0, 0.0));
    }

    #[test]
    fn test_temperature() {
        assert_eq!(temp_raw_to_celsius(0), 21.0);
        assert!((temp_raw_to_celsius(33387) - 121.0).abs() < 1e-2);
        // Sin corrección de signo
        assert!(temp_raw_to_celsius(0xFFFF) > 200.0);
    }
}

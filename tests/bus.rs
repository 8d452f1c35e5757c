//! Memory bus address decoding, banking, boot overlay, cheats and cartridge
//! lifecycle.

use pocketboy::GameBoy;
use pocketboy::cartridge::MbcKind;

fn plain_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x147] = 0x00;
    rom[0x148] = 0x00;
    rom
}

fn cgb_rom() -> Vec<u8> {
    let mut rom = plain_rom();
    rom[0x143] = 0x80;
    rom
}

#[test]
fn plain_32k_rom_gets_the_null_controller() {
    let mut gb = GameBoy::new();
    gb.load_rom(&plain_rom());
    assert_eq!(gb.bus.cart.kind, MbcKind::None);
    assert_eq!(gb.bus.cart.rom_banks, 2);
    assert_eq!(gb.bus.cart.rom_bank(), 1);
    assert!(!gb.bus.cgb);
}

#[test]
fn rom_reads_come_from_the_image() {
    let mut rom = plain_rom();
    rom[0x0000] = 0x12;
    rom[0x4000] = 0x34; // first byte of bank 1
    let mut gb = GameBoy::new();
    gb.load_rom(&rom);
    assert_eq!(gb.bus.read(0x0000), 0x12);
    assert_eq!(gb.bus.read(0x4000), 0x34);
    // ROM is not writable through the bus.
    gb.bus.write(0x4000, 0xEE);
    assert_eq!(gb.bus.read(0x4000), 0x34);
}

#[test]
fn wram_and_hram_are_read_write() {
    let mut gb = GameBoy::new();
    gb.load_rom(&plain_rom());
    gb.bus.write(0xC000, 0x11);
    gb.bus.write(0xDFFF, 0x22);
    gb.bus.write(0xFF80, 0x33);
    gb.bus.write(0xFFFE, 0x44);
    assert_eq!(gb.bus.read(0xC000), 0x11);
    assert_eq!(gb.bus.read(0xDFFF), 0x22);
    assert_eq!(gb.bus.read(0xFF80), 0x33);
    assert_eq!(gb.bus.read(0xFFFE), 0x44);
}

#[test]
fn echo_ram_mirrors_work_ram() {
    let mut gb = GameBoy::new();
    gb.load_rom(&plain_rom());
    gb.bus.write(0xC123, 0xAB);
    assert_eq!(gb.bus.read(0xE123), 0xAB);
    gb.bus.write(0xF045, 0xCD);
    assert_eq!(gb.bus.read(0xD045), 0xCD);
}

#[test]
fn cgb_wram_banking_via_ff70() {
    let mut gb = GameBoy::new();
    gb.load_rom(&cgb_rom());
    assert!(gb.bus.cgb);

    gb.bus.write(0xFF70, 0x02);
    gb.bus.write(0xD000, 0x22);
    gb.bus.write(0xFF70, 0x03);
    gb.bus.write(0xD000, 0x33);
    assert_eq!(gb.bus.read(0xD000), 0x33);
    gb.bus.write(0xFF70, 0x02);
    assert_eq!(gb.bus.read(0xD000), 0x22);
    assert_eq!(gb.bus.read(0xFF70), 0xF8 | 0x02);

    // Bank 0 is never mappable at 0xD000.
    gb.bus.write(0xFF70, 0x00);
    assert_eq!(gb.bus.read(0xFF70) & 0x07, 0x01);
}

#[test]
fn dmg_ignores_wram_banking() {
    let mut gb = GameBoy::new();
    gb.load_rom(&plain_rom());
    gb.bus.write(0xD000, 0x55);
    gb.bus.write(0xFF70, 0x04);
    assert_eq!(gb.bus.read(0xD000), 0x55);
    assert_eq!(gb.bus.read(0xFF70), 0xFF);
}

#[test]
fn boot_overlay_and_one_way_latch() {
    let mut rom = plain_rom();
    rom[0x0000] = 0x12;
    let mut gb = GameBoy::new();
    gb.load_rom(&rom);

    let mut boot = vec![0u8; 0x100];
    boot[0] = 0x99;
    gb.load_boot_rom(&boot);
    assert_eq!(gb.bus.read(0x0000), 0x99);
    // The overlay only covers the first 256 bytes.
    assert_eq!(gb.bus.read(0x0100), rom[0x100]);

    // Bit 0 clear does not disarm it.
    gb.bus.write(0xFF50, 0x00);
    assert_eq!(gb.bus.read(0x0000), 0x99);

    gb.bus.write(0xFF50, 0x01);
    assert_eq!(gb.bus.read(0x0000), 0x12);
    // One-way: writing again never re-enables.
    gb.bus.write(0xFF50, 0x01);
    gb.bus.write(0xFF50, 0x00);
    assert_eq!(gb.bus.read(0x0000), 0x12);
}

#[test]
fn cheat_overlay_wins_over_normal_decode() {
    let mut gb = GameBoy::new();
    gb.load_rom(&plain_rom());
    gb.bus.write(0xC200, 0x01);
    gb.bus.set_cheat(0xC200, 0x63);
    assert_eq!(gb.bus.read(0xC200), 0x63);
    // Writes still land underneath.
    gb.bus.write(0xC200, 0x02);
    assert_eq!(gb.bus.read(0xC200), 0x63);
    gb.bus.clear_cheat(0xC200);
    assert_eq!(gb.bus.read(0xC200), 0x02);
}

#[test]
fn unmapped_ranges_read_open_bus() {
    let mut gb = GameBoy::new();
    gb.load_rom(&plain_rom());
    assert_eq!(gb.bus.read(0xFEA0), 0xFF);
    assert_eq!(gb.bus.read(0xFF03), 0xFF);
    // Null collaborators behave the same way.
    assert_eq!(gb.bus.read(0x8000), 0xFF);
    assert_eq!(gb.bus.read(0xFE00), 0xFF);
    assert_eq!(gb.bus.read(0xFF40), 0xFF);
    assert_eq!(gb.bus.read(0xFF10), 0xFF);
}

#[test]
fn yanking_the_game_pak_leaves_open_bus_rom() {
    let mut rom = plain_rom();
    rom[0x0000] = 0x12;
    let mut gb = GameBoy::new();
    gb.load_rom(&rom);
    assert_eq!(gb.bus.read(0x0000), 0x12);

    gb.bus.yank_game_pak();
    assert_eq!(gb.bus.cart.kind, MbcKind::None);
    assert_eq!(gb.bus.read(0x0000), 0xFF);
    assert_eq!(gb.bus.read(0x7FFF), 0xFF);
}

#[test]
fn interrupt_registers_are_memory_mapped() {
    let mut gb = GameBoy::new();
    gb.load_rom(&plain_rom());
    gb.bus.write(0xFF0F, 0x05);
    assert_eq!(gb.bus.read(0xFF0F), 0xE0 | 0x05);
    gb.bus.write(0xFFFF, 0xFF);
    assert_eq!(gb.bus.read(0xFFFF), 0x1F);
}

#[test]
fn timer_registers_route_through_the_bus() {
    let mut gb = GameBoy::new();
    gb.load_rom(&plain_rom());
    gb.bus.write(0xFF06, 0x42);
    assert_eq!(gb.bus.read(0xFF06), 0x42);
    gb.bus.write(0xFF07, 0x05);
    assert_eq!(gb.bus.read(0xFF07), 0xF8 | 0x05);

    gb.bus.tick(512);
    assert_eq!(gb.bus.read(0xFF04), 2);
    // Any DIV write clears it.
    gb.bus.write(0xFF04, 0x77);
    assert_eq!(gb.bus.read(0xFF04), 0);
}

mod common;

use common::AxiLiteMaster;
use streamtb::prelude::*;
use streamtb::{run_tests, testbench, utils, SimConfig};

const CONFIG: u64 = 0x00;
const TX_DATA: u64 = 0x10;
const AVAIL: u64 = 0x14;
const STATUS: u64 = 0x2c;

fn config() -> SimConfig {
    SimConfig::new()
        .suite("udp_ctrl")
        .signal("clk", 1)
        .signal("reset", 1)
        .stream("io_bus_aw", &[("addr", 8)])
        .stream("io_bus_w", &[("data", 32), ("strb", 4)])
        .stream("io_bus_b", &[("resp", 2)])
        .stream("io_bus_ar", &[("addr", 8)])
        .stream("io_bus_r", &[("data", 32), ("resp", 2)])
        .print_summary(false)
}

async fn setup(dut: SimObject) -> Result<(SimObject, AxiLiteMaster), TbError> {
    let clk = dut.c("clk");
    let reset = dut.c("reset");
    Task::fork(testbench::clock_domain_async_reset(
        clk,
        Some(reset),
        SimTime::ns(50),
        10,
        "ns",
    ));
    Task::fork(common::axi_lite_regs(
        dut,
        "io_bus",
        clk,
        vec![(CONFIG, 0x13), (AVAIL, 0x04), (STATUS, 0)],
    ));
    let bus = AxiLiteMaster::start(dut, "io_bus", clk, Some(reset))?;
    Ok((clk, bus))
}

async fn udp_ctrl(dut: SimObject) -> TbResult {
    let (clk, bus) = setup(dut).await?;
    bus.read_assert(CONFIG, 0x13);
    bus.read_assert(STATUS, 0);
    bus.read_assert(AVAIL, 0x04);
    bus.write(TX_DATA, 0xab);
    utils::wait_until(clk, || bus.is_idle()).await?;
    bus.read_assert(TX_DATA, 0xab);
    bus.read(STATUS);
    utils::wait_until(clk, || bus.is_idle()).await?;
    bus.reads.verdict()?;
    bus.writes.verdict()?;
    Ok(Val::Int(bus.reads.uuts_counter() as i64))
}

async fn wrong_register_value(dut: SimObject) -> TbResult {
    let (clk, bus) = setup(dut).await?;
    bus.read_assert(AVAIL, 0x05);
    utils::wait_until(clk, || bus.is_idle()).await?;
    bus.reads.verdict()?;
    Ok(Val::None)
}

#[test]
fn axi_lite_register_access() {
    let report = run_tests!(config(), udp_ctrl, wrong_register_value);
    let ok = report.test("udp_ctrl").unwrap();
    assert_eq!(ok.result, Ok(Val::Int(5)));
    let bad = &report.test("wrong_register_value").unwrap().result;
    assert!(matches!(bad, Err(TbError::Mismatch { .. })), "{:?}", bad);
}

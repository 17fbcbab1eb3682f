fn main() {
    #[cfg(feature = "fuzz")]
    {
        afl::fuzz!(|data: &[u8]| {
            if let Ok(input) = std::str::from_utf8(data) {
                if fuzz(input.to_string()).is_err() {
                    println!("Fuzzing failed");
                } else {
                    println!("Fuzzing succeeded");
                }
            }
        });
    }
}

#[cfg(feature = "fuzz")]
fn fuzz(input: String) -> miette::Result<()> {
    use reconvergence::{report::ReportWriter, Options};

    let module = reconvergence::parse(&input).map_err(|err| err.with_source_code(input.clone()))?;
    let deps = reconvergence::analyze_module(&module, &Options::default())?;
    let mut writer = ReportWriter::new(Vec::new());
    for function in &deps {
        writer
            .write_function(function)
            .map_err(|err| miette::miette!("{}", err))?;
    }

    drop(writer.into_inner());
    Ok(())
}

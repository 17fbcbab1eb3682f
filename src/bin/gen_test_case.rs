use proptest::{
    strategy::{Strategy, ValueTree},
    test_runner::TestRunner,
};

fn main() {
    let mut runner = TestRunner::default();
    let gen = reconvergence::ast::arbitrary::arb_listing();
    let ast = match gen.new_tree(&mut runner) {
        Ok(tree) => tree.current(),
        Err(reason) => {
            eprintln!("failed to generate a listing: {}", reason);
            std::process::exit(1);
        }
    };
    println!("{}", ast);
}

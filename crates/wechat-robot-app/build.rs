fn main() {
    // Rebuild when embedded assets change.
    println!("cargo:rerun-if-changed=../../assets");
}

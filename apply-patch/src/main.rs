pub fn main() -> ! {
    warden_apply_patch::main()
}

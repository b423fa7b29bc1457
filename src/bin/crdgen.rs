use kube::CustomResourceExt;
use windlass::crd::{AppProject, Application};

fn main() {
    print!("{}", serde_yaml::to_string(&Application::crd()).unwrap());
    println!("---");
    print!("{}", serde_yaml::to_string(&AppProject::crd()).unwrap());
}
